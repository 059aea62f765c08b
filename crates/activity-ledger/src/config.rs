use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Recent event identities kept for dedup and undo matching.
    pub memory_capacity: usize,
    pub baseline_timeout_ms: u64,
    /// How long a timed-out day is left alone before it is requested again.
    pub baseline_retry_ms: u64,
    /// Ensure today's baseline before applying each event.
    pub ensure_baseline: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 400,
            baseline_timeout_ms: 15_000,
            baseline_retry_ms: 60_000,
            ensure_baseline: true,
        }
    }
}

impl LedgerConfig {
    pub fn baseline_timeout(&self) -> Duration {
        Duration::from_millis(self.baseline_timeout_ms)
    }

    pub fn baseline_retry(&self) -> Duration {
        Duration::from_millis(self.baseline_retry_ms)
    }
}
