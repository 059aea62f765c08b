//! post-tracker library
//!
//! Wires the tap, bridge and ledger crates into a runnable tracker and
//! exposes the pieces for the CLI and for integration testing

pub mod cli;
pub mod config;
pub mod notifier;
pub mod pipeline;
pub mod replay;
pub mod summary;

// Re-export commonly used types for external use
pub use config::AppConfig;
pub use notifier::{Notification, NotificationSink, Notifier};
pub use pipeline::{Pipeline, PipelineSnapshot, TimelineAccess};
pub use summary::DailySummary;
