use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use super::env::LogFormat;
use crate::config::AppConfig;

const LOCAL_CONFIG: &str = "config/post-tracker.yaml";

/// Installs the global subscriber on stderr, leaving stdout to command output.
pub fn init_logging(level: Level, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(level).into())
    });
    let layer = match format {
        LogFormat::Text => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .context("Failed to install log subscriber")
}

/// Config file to read: the explicit one, else the first existing default.
pub fn config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let user = dirs::config_dir().map(|dir| dir.join("post-tracker").join("config.yaml"));
    std::iter::once(PathBuf::from(LOCAL_CONFIG))
        .chain(user)
        .find(|candidate| candidate.is_file())
}

/// Reads the tracker config. A missing file means defaults; an unreadable or
/// malformed one is an error.
pub async fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = path.filter(|path| path.exists()) else {
        debug!(target: "post-tracker", path = ?path, "no config file; using defaults");
        return Ok(AppConfig::default());
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config = serde_yaml::from_str(&text)
        .with_context(|| format!("Invalid config in {}", path.display()))?;
    debug!(target: "post-tracker", path = %path.display(), "config loaded");
    Ok(config)
}
