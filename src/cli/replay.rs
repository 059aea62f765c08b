use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tokio::fs;
use tracing::warn;

use network_tap::SessionInfo;
use post_tracker_core_types::{Clock, SystemClock};
use post_tracker_state_store::{InMemoryStateStore, StateStore, StorageKey};

use crate::cli::context::CliContext;
use crate::cli::output::{emit, OutputFormat};
use crate::notifier::{LogSink, Notification, Notifier};
use crate::pipeline::{Pipeline, TimelineAccess};
use crate::replay::{parse_recording, replay, ReplayReport};
use crate::summary::DailySummary;

#[derive(Args, Clone, Debug)]
pub struct ReplayArgs {
    /// JSON-lines recording of page calls
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Apply events without reconciling against the timeline first
    #[arg(long)]
    pub no_baseline: bool,

    /// Use a throwaway in-memory store instead of the configured one
    #[arg(long)]
    pub in_memory: bool,

    /// How long to wait for the pipeline to drain, in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub settle_ms: u64,
}

#[derive(Serialize)]
struct ReplayOutput {
    report: ReplayReport,
    notifications: Vec<Notification>,
    summary: DailySummary,
}

pub async fn cmd_replay(args: ReplayArgs, ctx: &CliContext, output: &OutputFormat) -> Result<()> {
    let text = fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read recording {}", args.file.display()))?;
    let calls = parse_recording(&text).context("Failed to parse recording")?;

    let mut config = ctx.config().clone();
    let timeline = if args.no_baseline {
        config.ledger.ensure_baseline = false;
        TimelineAccess::Disabled
    } else {
        TimelineAccess::Live(SessionInfo {
            user_id: config.tap.user_id.clone(),
            screen_name: None,
        })
    };
    let store: Arc<dyn StateStore> = if args.in_memory {
        InMemoryStateStore::new()
    } else {
        ctx.store()
    };
    let clock = SystemClock::shared();

    let pipeline = Pipeline::start(&config, Arc::clone(&store), Arc::clone(&clock), timeline);
    let _notifier = config
        .notifier
        .enabled
        .then(|| Notifier::spawn(pipeline.signals(), Arc::new(LogSink)));

    let mut settle = Duration::from_millis(args.settle_ms);
    if config.ledger.ensure_baseline {
        settle += config.ledger.baseline_timeout();
    }
    let report = replay(&pipeline, &calls, settle).await;
    if !report.settled {
        warn!(target: "post-tracker", "replay finished before every event was applied");
    }
    let notifications = pipeline
        .goals_reached()
        .iter()
        .map(Notification::for_goal)
        .collect();
    pipeline.shutdown().await?;

    let items = store
        .get(&[StorageKey::DailyCounts, StorageKey::Goals])
        .await
        .context("Failed to read stored counters")?;
    let summary = DailySummary::build(&items.daily_counts()?, &items.goals(), clock.today(), 1);

    let result = ReplayOutput {
        report,
        notifications,
        summary,
    };
    emit(output, &result, || render(&result))
}

fn render(result: &ReplayOutput) -> String {
    let report = &result.report;
    let mut out = format!(
        "Replayed {} calls: {} applied, {} duplicate, {} failed, {} transport errors\n",
        report.calls,
        report.pipeline.applied,
        report.pipeline.duplicates,
        report.pipeline.failed,
        report.transport_errors
    );
    for note in &result.notifications {
        out.push_str(&format!("{}: {}\n", note.title, note.body));
    }
    out.push_str(&result.summary.render_text());
    out
}
