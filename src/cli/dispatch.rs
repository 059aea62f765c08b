use super::env::CliArgs;
use super::goals::cmd_goals;
use super::replay::cmd_replay;
use super::summary::cmd_summary;
use super::sync::cmd_sync;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Summary(args) => cmd_summary(args, ctx, &cli.output).await,
        Commands::Goals(args) => cmd_goals(args, ctx, &cli.output).await,
        Commands::Replay(args) => cmd_replay(args, ctx, &cli.output).await,
        Commands::Sync(args) => cmd_sync(args, ctx, &cli.output).await,
    }
}
