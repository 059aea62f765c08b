use serde::{Deserialize, Serialize};

use crate::date::DateKey;
use crate::goals::GoalKind;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalAchieved {
    pub goal: GoalKind,
    pub achieved: u64,
    pub date_key: DateKey,
}

/// Fire-and-forget signals raised by the logic side for views and notifiers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RuntimeSignal {
    /// Counters changed; any open summary should re-render.
    #[serde(rename = "xPostTracker:update")]
    Update,
    #[serde(rename = "xPostTracker:goalAchieved")]
    GoalAchieved(GoalAchieved),
}
