//! Goal threshold evaluation and goal editing.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::info;

use post_tracker_core_types::{
    clamp_goal_value, DateKey, DayCounters, GoalAchieved, GoalConfig, GoalKind, RuntimeSignal,
};
use post_tracker_event_bus::SignalBus;
use post_tracker_state_store::{StateStore, StorageItems, StorageKey};

use crate::errors::LedgerResult;

/// Marks every goal reached on `day` that has not been flagged yet and returns
/// one signal per newly reached goal. Flags are never cleared here.
pub fn evaluate_goals(
    goals: &GoalConfig,
    counters: &DayCounters,
    flags: &mut BTreeMap<GoalKind, bool>,
    day: DateKey,
) -> Vec<GoalAchieved> {
    let mut reached = Vec::new();
    for kind in GoalKind::ALL {
        let target = goals.target(kind);
        if target == 0 {
            continue;
        }
        let achieved = kind.achieved(counters);
        let notified = flags.entry(kind).or_insert(false);
        if achieved >= target && !*notified {
            *notified = true;
            reached.push(GoalAchieved {
                goal: kind,
                achieved,
                date_key: day,
            });
        }
    }
    reached
}

pub async fn load_goals(store: &dyn StateStore) -> LedgerResult<GoalConfig> {
    let items = store.get(&[StorageKey::Goals]).await?;
    Ok(items.goals())
}

/// Applies user-entered goal values. Each value is clamped like form input:
/// missing or unparseable values keep the current target.
pub async fn update_goals(
    store: &dyn StateStore,
    signals: &SignalBus,
    posts: Option<&Value>,
    replies: Option<&Value>,
) -> LedgerResult<GoalConfig> {
    let current = load_goals(store).await?;
    let updated = GoalConfig {
        posts: clamp_goal_value(posts, current.posts),
        replies: clamp_goal_value(replies, current.replies),
    };
    let mut items = StorageItems::new();
    items.set_goals(&updated)?;
    store.set(items).await?;
    info!(
        target: "activity-ledger",
        posts = updated.posts,
        replies = updated.replies,
        "goals updated"
    );
    signals.publish(RuntimeSignal::Update);
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> DateKey {
        DateKey::from_ymd(2024, 3, 3).unwrap()
    }

    #[test]
    fn reached_goal_flags_once() {
        let goals = GoalConfig {
            posts: 2,
            replies: 1,
        };
        let mut flags = BTreeMap::new();
        let counters = DayCounters {
            posts: 2,
            ..DayCounters::default()
        };
        let reached = evaluate_goals(&goals, &counters, &mut flags, day());
        assert_eq!(
            reached,
            vec![GoalAchieved {
                goal: GoalKind::Posts,
                achieved: 2,
                date_key: day()
            }]
        );
        assert_eq!(flags.get(&GoalKind::Replies), Some(&false));

        let more = DayCounters {
            posts: 3,
            ..DayCounters::default()
        };
        assert!(evaluate_goals(&goals, &more, &mut flags, day()).is_empty());
    }

    #[test]
    fn zero_target_disables_goal() {
        let goals = GoalConfig {
            posts: 0,
            replies: 0,
        };
        let mut flags = BTreeMap::new();
        let counters = DayCounters {
            posts: 9,
            replies: 9,
            ..DayCounters::default()
        };
        assert!(evaluate_goals(&goals, &counters, &mut flags, day()).is_empty());
        assert!(flags.is_empty());
    }
}
