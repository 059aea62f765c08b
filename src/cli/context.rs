use std::sync::Arc;

use post_tracker_state_store::{FileStateStore, StateStore};

use crate::config::AppConfig;

pub struct CliContext {
    config: Arc<AppConfig>,
}

impl CliContext {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &AppConfig {
        self.config.as_ref()
    }

    /// Durable store at the configured path.
    pub fn store(&self) -> Arc<dyn StateStore> {
        FileStateStore::new(self.config.storage_path.clone())
    }
}
