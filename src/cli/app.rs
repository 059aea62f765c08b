use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{config_file, init_logging, load_config};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();
    init_logging(cli.log_level, cli.log_format)?;

    let mut config = load_config(config_file(cli.config.as_deref()).as_deref()).await?;
    if let Some(storage) = &cli.storage {
        config.storage_path = storage.clone();
    }
    debug!(target: "post-tracker", storage = %config.storage_path.display(), "tracker configured");

    let ctx = CliContext::new(config);
    let result = dispatch(&cli, &ctx).await;
    if let Err(err) = &result {
        error!(target: "post-tracker", error = %format!("{err:#}"), "command failed");
    }
    result
}
