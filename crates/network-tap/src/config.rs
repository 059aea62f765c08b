//! Configuration types for the network tap.

use serde::{Deserialize, Serialize};

/// Public web-client bearer used when no page call has revealed credentials yet.
/// It only carries guest-level privileges.
pub const PUBLIC_BEARER: &str = "Bearer AAAAAAAAAAAAAAAAAAAAAANRILgAAAAAAtJc1Zixvp5Fo5xFFtci9P/1JHEw=9P3sJ8xx9G8/2zSS9Q7iY+Xw/vAXXNz";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    /// Capacity of the tracked-event broadcast channel.
    pub buffer: usize,
    pub fallback_authorization: String,
    pub client_language: String,
    /// Session user id; when unset it is read from the page state.
    pub user_id: Option<String>,
    /// Raw `Cookie` header of the page, consulted for the `ct0` CSRF token.
    pub cookie: Option<String>,
    pub timeline: TimelineConfig,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            buffer: 256,
            fallback_authorization: PUBLIC_BEARER.to_string(),
            client_language: "en".to_string(),
            user_id: None,
            cookie: None,
            timeline: TimelineConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub url: String,
    pub count: u32,
    pub request_timeout_ms: u64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            url: "https://x.com/i/api/1.1/statuses/user_timeline.json".to_string(),
            count: 200,
            request_timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_bearer_matches_web_client_token() {
        assert_eq!(
            PUBLIC_BEARER,
            "Bearer AAAAAAAAAAAAAAAAAAAAAANRILgAAAAAAtJc1Zixvp5Fo5xFFtci9P/1JHEw=9P3sJ8xx9G8/2zSS9Q7iY+Xw/vAXXNz"
        );
        assert_eq!(TapConfig::default().fallback_authorization, PUBLIC_BEARER);
    }
}
