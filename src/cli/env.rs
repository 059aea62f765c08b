use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::Level;

use super::commands::Commands;
use super::output::OutputFormat;

/// Counts the posts, replies, reposts and likes made from a browser session.
#[derive(Parser)]
#[command(name = "post-tracker", version, about)]
pub struct CliArgs {
    /// YAML config; defaults to ./config/post-tracker.yaml, then the user config dir
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Counter storage file, overriding `storage_path` from the config
    #[arg(short, long, value_name = "FILE", global = true)]
    pub storage: Option<PathBuf>,

    /// Minimum level logged to stderr; `RUST_LOG` takes precedence
    #[arg(short, long, default_value_t = Level::WARN, global = true)]
    pub log_level: Level,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Human, global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_follow_the_subcommand() {
        let args = CliArgs::try_parse_from([
            "post-tracker",
            "summary",
            "--storage",
            "/tmp/counts.json",
            "-l",
            "debug",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(args.storage, Some(PathBuf::from("/tmp/counts.json")));
        assert_eq!(args.log_level, Level::DEBUG);
        assert_eq!(args.log_format, LogFormat::Json);
        assert!(matches!(args.command, Commands::Summary(_)));
    }
}
