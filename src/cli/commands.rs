use clap::Subcommand;

use super::goals::GoalsArgs;
use super::replay::ReplayArgs;
use super::summary::SummaryArgs;
use super::sync::SyncArgs;

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Show counters, activity level and goal progress for a day
    Summary(SummaryArgs),

    /// Show or edit the daily goals
    Goals(GoalsArgs),

    /// Drive a recording of page calls through the tracker
    Replay(ReplayArgs),

    /// Reconcile today's counters against the live timeline
    Sync(SyncArgs),
}
