//! Daily goal targets and per-day "already notified" flags.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::counters::DayCounters;
use crate::date::DateKey;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalKind {
    Posts,
    Replies,
}

impl GoalKind {
    pub const ALL: [GoalKind; 2] = [Self::Posts, Self::Replies];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Replies => "replies",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Posts => "Posts",
            Self::Replies => "Replies",
        }
    }

    pub fn singular(&self) -> &'static str {
        match self {
            Self::Posts => "post",
            Self::Replies => "reply",
        }
    }

    pub fn achieved(&self, counters: &DayCounters) -> u64 {
        match self {
            Self::Posts => counters.posts,
            Self::Replies => counters.replies,
        }
    }
}

impl fmt::Display for GoalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Daily targets. Zero disables a goal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct GoalConfig {
    pub posts: u64,
    pub replies: u64,
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            posts: 1,
            replies: 1,
        }
    }
}

impl GoalConfig {
    pub fn target(&self, kind: GoalKind) -> u64 {
        match kind {
            GoalKind::Posts => self.posts,
            GoalKind::Replies => self.replies,
        }
    }

    /// Reads whatever was stored under `goals`, falling back to the defaults
    /// field by field.
    pub fn from_stored(stored: Option<&Value>) -> Self {
        let defaults = Self::default();
        let field = |name: &str| stored.and_then(|value| value.get(name));
        Self {
            posts: clamp_goal_value(field("posts"), defaults.posts),
            replies: clamp_goal_value(field("replies"), defaults.replies),
        }
    }
}

/// Missing, null or empty input keeps the fallback; numeric strings parse;
/// negatives clamp to zero; anything else keeps the fallback.
pub fn clamp_goal_value(value: Option<&Value>, fallback: u64) -> u64 {
    match value {
        None | Some(Value::Null) => fallback,
        Some(Value::Number(number)) => match number.as_i64() {
            Some(parsed) => parsed.max(0) as u64,
            None => number
                .as_f64()
                .map(|parsed| parsed.max(0.0).trunc() as u64)
                .unwrap_or(fallback),
        },
        Some(Value::String(text)) => parse_leading_int(text).map_or(fallback, |v| v.max(0) as u64),
        Some(_) => fallback,
    }
}

/// Leading-integer parse: `"12abc"` is 12, `"abc"` is nothing.
fn parse_leading_int(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|v| v * sign)
}

pub type GoalNotifications = BTreeMap<DateKey, BTreeMap<GoalKind, bool>>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stored_goals_fall_back_per_field() {
        let goals = GoalConfig::from_stored(Some(&json!({ "posts": "3" })));
        assert_eq!(goals, GoalConfig { posts: 3, replies: 1 });
        assert_eq!(GoalConfig::from_stored(None), GoalConfig::default());
    }

    #[test]
    fn clamp_handles_user_input() {
        assert_eq!(clamp_goal_value(Some(&json!("")), 1), 1);
        assert_eq!(clamp_goal_value(Some(&json!("-4")), 1), 0);
        assert_eq!(clamp_goal_value(Some(&json!("7 posts")), 1), 7);
        assert_eq!(clamp_goal_value(Some(&json!("many")), 2), 2);
        assert_eq!(clamp_goal_value(Some(&json!(0)), 1), 0);
        assert_eq!(clamp_goal_value(Some(&json!(true)), 5), 5);
    }
}
