//! Tracked user actions and their identities.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::date::DateKey;

const UNKNOWN_REMOTE_ID: &str = "unknown";

/// Activity kind an intercepted call was classified as.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Classification {
    Post,
    Reply,
    Like,
    Repost,
}

impl Classification {
    pub const ALL: [Classification; 4] = [Self::Post, Self::Reply, Self::Like, Self::Repost];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Reply => "reply",
            Self::Like => "like",
            Self::Repost => "repost",
        }
    }

    /// Lenient wire decoding: `share` is the old name for reposts and anything
    /// unrecognized counts as a post.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "reply" => Self::Reply,
            "like" => Self::Like,
            "repost" | "share" => Self::Repost,
            _ => Self::Post,
        }
    }
}

impl From<String> for Classification {
    fn from(value: String) -> Self {
        Self::from_wire(&value)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an action was performed or undone.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    Create,
    Delete,
}

impl Direction {
    pub fn from_delta(delta: i64) -> Self {
        if delta < 0 {
            Self::Delete
        } else {
            Self::Create
        }
    }

    pub fn delta(&self) -> i64 {
        match self {
            Self::Create => 1,
            Self::Delete => -1,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Create => "pos",
            Self::Delete => "neg",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Create => Self::Delete,
            Self::Delete => Self::Create,
        }
    }
}

/// Identity an action on a known remote item uses: `<kind>:<remote id>:<pos|neg>`.
pub fn canonical_event_id(
    classification: Classification,
    remote_id: &str,
    direction: Direction,
) -> String {
    format!("{}:{}:{}", classification, remote_id, direction.suffix())
}

/// Swaps the direction suffix of an identity. Identities without one have no
/// canonical counterpart.
pub fn opposite_event_id(event_id: &str) -> Option<String> {
    let (stem, suffix) = event_id.rsplit_once(':')?;
    let swapped = match suffix {
        "pos" => Direction::Delete.suffix(),
        "neg" => Direction::Create.suffix(),
        _ => return None,
    };
    Some(format!("{stem}:{swapped}"))
}

fn default_delta() -> i64 {
    1
}

/// One observed user action, as carried on the bridge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub classification: Classification,
    #[serde(rename = "tweetId", default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default = "default_delta")]
    pub delta: i64,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undo_of: Option<String>,
}

impl TrackedEvent {
    /// Event for an action on a known remote item, carrying its canonical identity
    /// and, for undos, a reference to the positive action it reverses.
    pub fn for_remote(
        classification: Classification,
        remote_id: impl Into<String>,
        direction: Direction,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let remote_id = remote_id.into();
        let undo_of = match direction {
            Direction::Delete => Some(canonical_event_id(
                classification,
                &remote_id,
                Direction::Create,
            )),
            Direction::Create => None,
        };
        Self {
            event_id: Some(canonical_event_id(classification, &remote_id, direction)),
            classification,
            remote_id: Some(remote_id),
            delta: direction.delta(),
            timestamp,
            undo_of,
        }
    }

    /// Event whose remote item could not be identified; the ledger derives its id.
    pub fn anonymous(
        classification: Classification,
        direction: Direction,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: None,
            classification,
            remote_id: None,
            delta: direction.delta(),
            timestamp,
            undo_of: None,
        }
    }

    pub fn direction(&self) -> Direction {
        Direction::from_delta(self.delta)
    }

    /// Explicit identity when the source supplied one, otherwise
    /// `<kind>:<remote id|unknown>:<timestamp ms>:<pos|neg>`.
    pub fn identity(&self) -> String {
        if let Some(id) = self.event_id.as_deref().filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        let remote = self
            .remote_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(UNKNOWN_REMOTE_ID);
        format!(
            "{}:{}:{}:{}",
            self.classification,
            remote,
            self.timestamp.timestamp_millis(),
            self.direction().suffix()
        )
    }

    pub fn date_key(&self) -> DateKey {
        DateKey::for_instant(&self.timestamp)
    }
}
