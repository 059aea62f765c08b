use anyhow::{Context, Result};
use clap::Args;

use post_tracker_core_types::{Clock, DateKey, SystemClock};
use post_tracker_state_store::StorageKey;

use crate::cli::context::CliContext;
use crate::cli::output::{emit, OutputFormat};
use crate::summary::DailySummary;

#[derive(Args, Clone, Debug)]
pub struct SummaryArgs {
    /// Day to show (YYYY-MM-DD); defaults to today
    #[arg(long, value_name = "DATE")]
    pub date: Option<DateKey>,

    /// Trailing days in the activity strip
    #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u16).range(0..=366))]
    pub days: u16,
}

pub async fn cmd_summary(args: SummaryArgs, ctx: &CliContext, output: &OutputFormat) -> Result<()> {
    let store = ctx.store();
    let items = store
        .get(&[StorageKey::DailyCounts, StorageKey::Goals])
        .await
        .context("Failed to read stored counters")?;
    let daily = items.daily_counts()?;
    let key = args.date.unwrap_or_else(|| SystemClock::shared().today());
    let summary = DailySummary::build(&daily, &items.goals(), key, usize::from(args.days));
    emit(output, &summary, || summary.render_text())
}
