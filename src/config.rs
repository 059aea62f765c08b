//! Application configuration.
//!
//! Loaded from YAML by the CLI runtime; every section falls back to its
//! crate's defaults so a partial file is enough.

use std::path::PathBuf;

use extensions_bridge::BridgeConfig;
use network_tap::config::TapConfig;
use post_tracker_ledger::LedgerConfig;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// JSON document holding counters, goals, notification flags and baselines.
    pub storage_path: PathBuf,
    /// Capacity of the runtime signal bus.
    pub signal_capacity: usize,
    pub tap: TapConfig,
    pub bridge: BridgeConfig,
    pub ledger: LedgerConfig,
    pub notifier: NotifierConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            signal_capacity: 64,
            tap: TapConfig::default(),
            bridge: BridgeConfig::default(),
            ledger: LedgerConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub enabled: bool,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_storage_path() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("post-tracker");
    path.push("storage.json");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_section_defaults() {
        let yaml = "storage_path: /tmp/tracker.json\nledger:\n  baseline_timeout_ms: 500\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage_path, PathBuf::from("/tmp/tracker.json"));
        assert_eq!(config.ledger.baseline_timeout_ms, 500);
        assert_eq!(config.ledger.memory_capacity, 400);
        assert_eq!(config.bridge.capacity, 128);
        assert!(config.notifier.enabled);
    }

    #[test]
    fn default_store_lives_under_data_dir() {
        let config = AppConfig::default();
        assert!(config.storage_path.ends_with("post-tracker/storage.json"));
    }
}
