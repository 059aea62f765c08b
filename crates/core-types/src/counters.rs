use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::date::DateKey;
use crate::event::Classification;

/// Per-day aggregate. No field ever goes below zero.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredDayCounters")]
pub struct DayCounters {
    pub posts: u64,
    pub replies: u64,
    pub likes: u64,
    pub reposts: u64,
}

/// Stored shape, tolerating the legacy `shares` field and partial entries.
/// Unreadable field values count as zero.
#[derive(Deserialize)]
struct StoredDayCounters {
    #[serde(default, deserialize_with = "lenient_count")]
    posts: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    replies: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    likes: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    reposts: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    shares: u64,
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let number = match &value {
        Value::Number(number) => match number.as_u64() {
            Some(count) => return Ok(count),
            None => number.as_f64(),
        },
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number
        .filter(|n| n.is_finite() && *n > 0.0)
        .map_or(0, |n| n.floor() as u64))
}

impl From<StoredDayCounters> for DayCounters {
    fn from(stored: StoredDayCounters) -> Self {
        Self {
            posts: stored.posts,
            replies: stored.replies,
            likes: stored.likes,
            reposts: stored.reposts.max(stored.shares),
        }
    }
}

impl DayCounters {
    pub fn get(&self, classification: Classification) -> u64 {
        match classification {
            Classification::Post => self.posts,
            Classification::Reply => self.replies,
            Classification::Like => self.likes,
            Classification::Repost => self.reposts,
        }
    }

    fn field_mut(&mut self, classification: Classification) -> &mut u64 {
        match classification {
            Classification::Post => &mut self.posts,
            Classification::Reply => &mut self.replies,
            Classification::Like => &mut self.likes,
            Classification::Repost => &mut self.reposts,
        }
    }

    /// Applies a signed delta to one field, clamping at zero. Returns the new value.
    pub fn apply_delta(&mut self, classification: Classification, delta: i64) -> u64 {
        let field = self.field_mut(classification);
        *field = field.saturating_add_signed(delta);
        *field
    }

    /// Per-field max. Heals undercounts, never lowers a local count.
    pub fn merge_max(&mut self, other: &DayCounters) {
        self.posts = self.posts.max(other.posts);
        self.replies = self.replies.max(other.replies);
        self.likes = self.likes.max(other.likes);
        self.reposts = self.reposts.max(other.reposts);
    }

    /// Posts plus replies; the figure the daily heatmap is bucketed by.
    pub fn total(&self) -> u64 {
        self.posts + self.replies
    }
}

pub type DailyCounts = BTreeMap<DateKey, DayCounters>;

/// Marks whether authoritative reconciliation completed for a day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    pub synced: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub counts: DayCounters,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decrement_clamps_at_zero() {
        let mut counters = DayCounters::default();
        assert_eq!(counters.apply_delta(Classification::Like, -1), 0);
        assert_eq!(counters.apply_delta(Classification::Like, 1), 1);
        assert_eq!(counters.apply_delta(Classification::Like, -1), 0);
    }

    #[test]
    fn merge_never_decreases() {
        let mut local = DayCounters {
            posts: 5,
            replies: 2,
            ..Default::default()
        };
        let remote = DayCounters {
            posts: 3,
            replies: 7,
            ..Default::default()
        };
        local.merge_max(&remote);
        assert_eq!(local.posts, 5);
        assert_eq!(local.replies, 7);
    }

    #[test]
    fn legacy_shares_fold_into_reposts() {
        let counters: DayCounters =
            serde_json::from_value(json!({ "posts": 1, "shares": 4, "reposts": 2 })).unwrap();
        assert_eq!(counters.reposts, 4);
        assert_eq!(counters.likes, 0);
        let written = serde_json::to_value(counters).unwrap();
        assert!(written.get("shares").is_none());
    }

    #[test]
    fn unreadable_fields_count_as_zero() {
        let daily: DailyCounts = serde_json::from_value(json!({
            "2024-06-01": { "posts": 1.0, "replies": -2, "likes": "x", "reposts": "3", "shares": null },
            "2024-06-02": { "posts": 2.7, "likes": true }
        }))
        .unwrap();
        let first = daily[&DateKey::from_ymd(2024, 6, 1).unwrap()];
        assert_eq!(
            first,
            DayCounters {
                posts: 1,
                replies: 0,
                likes: 0,
                reposts: 3,
            }
        );
        let second = daily[&DateKey::from_ymd(2024, 6, 2).unwrap()];
        assert_eq!(second.posts, 2);
        assert_eq!(second.likes, 0);
    }
}
