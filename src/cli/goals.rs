use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value;

use post_tracker_core_types::{GoalConfig, GoalKind};
use post_tracker_event_bus::{InMemoryBus, SignalBus};
use post_tracker_ledger::{load_goals, update_goals};

use crate::cli::context::CliContext;
use crate::cli::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct GoalsArgs {
    #[command(subcommand)]
    pub action: GoalsAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum GoalsAction {
    /// Show the current daily goals
    Show,

    /// Set daily goals; omitted or unparseable values keep the current goal
    Set {
        /// Posts per day
        #[arg(long, allow_hyphen_values = true)]
        posts: Option<String>,

        /// Replies per day
        #[arg(long, allow_hyphen_values = true)]
        replies: Option<String>,
    },
}

pub async fn cmd_goals(args: GoalsArgs, ctx: &CliContext, output: &OutputFormat) -> Result<()> {
    let store = ctx.store();
    let goals = match args.action {
        GoalsAction::Show => load_goals(store.as_ref())
            .await
            .context("Failed to read goals")?,
        GoalsAction::Set { posts, replies } => {
            let signals: Arc<SignalBus> = InMemoryBus::new(1);
            let posts = posts.map(Value::String);
            let replies = replies.map(Value::String);
            update_goals(
                store.as_ref(),
                signals.as_ref(),
                posts.as_ref(),
                replies.as_ref(),
            )
            .await
            .context("Failed to save goals")?
        }
    };
    emit(output, &goals, || render_goals(&goals))
}

fn render_goals(goals: &GoalConfig) -> String {
    GoalKind::ALL
        .iter()
        .map(|kind| format!("{} goal: {} per day\n", kind.label(), goals.target(*kind)))
        .collect()
}
