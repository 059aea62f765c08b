use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use network_tap::SessionInfo;
use post_tracker_core_types::{Clock, SystemClock};
use post_tracker_ledger::BaselineOutcome;
use post_tracker_state_store::StorageKey;

use crate::cli::context::CliContext;
use crate::cli::output::{emit, OutputFormat};
use crate::pipeline::{Pipeline, TimelineAccess};
use crate::summary::DailySummary;

#[derive(Args, Clone, Debug)]
pub struct SyncArgs {
    /// Signed-in user id; overrides `tap.user_id`
    #[arg(long)]
    pub user_id: Option<String>,
}

#[derive(Serialize)]
struct SyncOutput {
    baseline: BaselineOutcome,
    summary: DailySummary,
}

pub async fn cmd_sync(args: SyncArgs, ctx: &CliContext, output: &OutputFormat) -> Result<()> {
    let config = ctx.config();
    let Some(user_id) = args.user_id.or_else(|| config.tap.user_id.clone()) else {
        bail!("No session user id; pass --user-id or set tap.user_id in the config");
    };

    let store = ctx.store();
    let clock = SystemClock::shared();
    let pipeline = Pipeline::start(
        config,
        store.clone(),
        clock.clone(),
        TimelineAccess::Live(SessionInfo::with_user_id(user_id)),
    );
    let baseline = pipeline
        .reconciler()
        .ensure()
        .await
        .context("Baseline reconciliation failed")?;
    pipeline.shutdown().await?;

    let items = store
        .get(&[StorageKey::DailyCounts, StorageKey::Goals])
        .await
        .context("Failed to read stored counters")?;
    let summary = DailySummary::build(&items.daily_counts()?, &items.goals(), clock.today(), 1);
    let result = SyncOutput { baseline, summary };
    emit(output, &result, || {
        let status = match (result.baseline.synced, result.baseline.timed_out) {
            (true, _) => "Baseline synced",
            (false, true) => "Baseline not synced: timed out",
            (false, false) => "Baseline not synced: timeline unavailable",
        };
        format!("{status}\n{}", result.summary.render_text())
    })
}
