//! Page-side authoritative daily totals, read from the user's own timeline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use post_tracker_core_types::{DateKey, DayCounters};

use crate::auth::AuthCache;
use crate::classify::truthy;
use crate::config::TapConfig;
use crate::TapError;

const PLATFORM_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Who the page is signed in as.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub user_id: Option<String>,
    pub screen_name: Option<String>,
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl SessionInfo {
    /// Reads the page's bootstrap state (`session`/`user` blocks), falling back
    /// to the `user-id` / `screen-name` meta values.
    pub fn from_page_state(
        state: &Value,
        meta_user_id: Option<&str>,
        meta_screen_name: Option<&str>,
    ) -> Self {
        let empty = Value::Null;
        let session = [state.get("session"), state.get("user")]
            .into_iter()
            .find(|v| truthy(*v))
            .flatten()
            .unwrap_or(&empty);
        let user = [session.get("user"), session.get("account")]
            .into_iter()
            .find(|v| truthy(*v))
            .flatten()
            .unwrap_or(&empty);
        let user_id = text(session.get("user_id"))
            .or_else(|| text(session.get("userId")))
            .or_else(|| text(user.get("id")))
            .or_else(|| meta_user_id.filter(|v| !v.is_empty()).map(str::to_string));
        let screen_name = text(user.get("screen_name"))
            .or_else(|| text(user.get("username")))
            .or_else(|| meta_screen_name.filter(|v| !v.is_empty()).map(str::to_string));
        Self {
            user_id,
            screen_name,
        }
    }

    pub fn with_user_id(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            screen_name: None,
        }
    }
}

/// Source of the user's recent timeline items.
#[async_trait]
pub trait TimelineSource: Send + Sync {
    async fn fetch_timeline(&self) -> Result<Vec<Value>, TapError>;
}

/// Authenticated GET against the platform's user timeline endpoint.
pub struct HttpTimelineSource {
    client: reqwest::Client,
    auth: Arc<AuthCache>,
    config: TapConfig,
    session: SessionInfo,
}

impl HttpTimelineSource {
    pub fn new(
        config: TapConfig,
        auth: Arc<AuthCache>,
        session: SessionInfo,
    ) -> Result<Self, TapError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeline.request_timeout_ms.max(1)))
            .build()
            .map_err(|err| TapError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            auth,
            config,
            session,
        })
    }

    fn timeline_url(&self, user_id: &str) -> Result<Url, TapError> {
        let mut url = Url::parse(&self.config.timeline.url)
            .map_err(|err| TapError::Internal(format!("timeline url: {err}")))?;
        url.query_pairs_mut()
            .append_pair("user_id", user_id)
            .append_pair("count", &self.config.timeline.count.to_string())
            .append_pair("include_rts", "true")
            .append_pair("exclude_replies", "false")
            .append_pair("tweet_mode", "extended");
        Ok(url)
    }
}

#[async_trait]
impl TimelineSource for HttpTimelineSource {
    async fn fetch_timeline(&self) -> Result<Vec<Value>, TapError> {
        let user_id = self
            .session
            .user_id
            .as_deref()
            .ok_or(TapError::MissingUserId)?;
        let url = self.timeline_url(user_id)?;
        let mut request = self.client.get(url).header("accept", "application/json");
        for (name, value) in self.auth.request_headers(
            &self.config.fallback_authorization,
            self.config.cookie.as_deref(),
            &self.config.client_language,
        ) {
            request = request.header(name, value);
        }
        if let Some(cookie) = self.config.cookie.as_deref() {
            request = request.header("cookie", cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|err| TapError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TapError::Remote {
                status: status.as_u16(),
            });
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|err| TapError::UnexpectedPayload(err.to_string()))?;
        match payload {
            Value::Array(items) => Ok(items),
            _ => Err(TapError::UnexpectedPayload(
                "timeline payload is not an array".into(),
            )),
        }
    }
}

/// Accepts the platform's `Wed Oct 10 20:19:24 +0000 2018` format and RFC 3339.
pub fn parse_created_at(item: &Value) -> Option<DateTime<FixedOffset>> {
    let raw = item
        .get("created_at")
        .or_else(|| item.pointer("/legacy/created_at"))?
        .as_str()?;
    DateTime::parse_from_str(raw, PLATFORM_DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}

fn legacy(item: &Value) -> &Value {
    item.get("legacy").filter(|v| v.is_object()).unwrap_or(item)
}

fn is_repost(item: &Value) -> bool {
    let legacy = legacy(item);
    ["retweeted_status_id_str", "retweeted_status", "retweeted_status_id"]
        .iter()
        .any(|field| truthy(legacy.get(field)))
}

fn is_reply(item: &Value) -> bool {
    let legacy = legacy(item);
    ["in_reply_to_status_id_str", "in_reply_to_status_id"]
        .iter()
        .any(|field| truthy(legacy.get(field)))
}

/// Counts items created during `day` as reposts, replies or posts.
/// Likes are not visible on the timeline and stay at zero.
pub fn bucket_timeline(items: &[Value], day: DateKey) -> DayCounters {
    let mut counts = DayCounters::default();
    for item in items {
        let Some(created_at) = parse_created_at(item) else {
            continue;
        };
        if !day.contains(&created_at) {
            continue;
        }
        if is_repost(item) {
            counts.reposts += 1;
        } else if is_reply(item) {
            counts.replies += 1;
        } else {
            counts.posts += 1;
        }
    }
    counts
}

/// Answers baseline requests from a [`TimelineSource`].
pub struct BaselineCollector {
    source: Arc<dyn TimelineSource>,
}

impl BaselineCollector {
    pub fn new(source: Arc<dyn TimelineSource>) -> Self {
        Self { source }
    }

    pub async fn collect(&self, day: DateKey) -> Result<DayCounters, TapError> {
        let items = match self.source.fetch_timeline().await {
            Ok(items) => items,
            Err(err) => {
                warn!(target: "network-tap", %day, error = %err, "baseline fetch failed");
                return Err(err);
            }
        };
        let counts = bucket_timeline(&items, day);
        debug!(
            target: "network-tap",
            %day,
            items = items.len(),
            posts = counts.posts,
            replies = counts.replies,
            reposts = counts.reposts,
            "timeline bucketed"
        );
        Ok(counts)
    }
}
