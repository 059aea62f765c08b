//! Event bridge configuration.

use serde::{Deserialize, Serialize};

/// Tag every envelope on the bridge must carry.
pub const SOURCE_TAG: &str = "x-post-tracker";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub source_tag: String,
    /// Envelopes buffered per subscriber before the slowest one starts lagging.
    pub capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            source_tag: SOURCE_TAG.to_string(),
            capacity: 128,
        }
    }
}
