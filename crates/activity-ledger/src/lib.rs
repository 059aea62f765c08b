//! Stateful core of the tracker: deduplicates tracked events, applies their
//! signed deltas to per-day counters in the durable store, flags reached goals
//! and reconciles each day against the platform's own totals.

pub mod baseline;
pub mod config;
pub mod errors;
pub mod goals;
pub mod ledger;
pub mod memory;

pub use baseline::{BaselineOutcome, BaselineReconciler};
pub use config::LedgerConfig;
pub use errors::{LedgerError, LedgerResult};
pub use goals::{evaluate_goals, load_goals, update_goals};
pub use ledger::{AppliedEvent, EventLedger, LedgerOutcome};
pub use memory::{MemoryEntry, RecentEventMemory};
