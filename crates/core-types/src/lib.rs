//! Shared primitives for the post-tracker workspace.
//!
//! Everything persisted in the durable store or carried across the page/logic
//! boundary is defined here so every crate agrees on one wire shape.

pub mod clock;
pub mod counters;
pub mod date;
pub mod event;
pub mod goals;
pub mod signal;

pub use clock::{Clock, ManualClock, SystemClock};
pub use counters::{BaselineSnapshot, DailyCounts, DayCounters};
pub use date::{DateKey, DateKeyError};
pub use event::{Classification, Direction, TrackedEvent};
pub use goals::{clamp_goal_value, GoalConfig, GoalKind, GoalNotifications};
pub use signal::{GoalAchieved, RuntimeSignal};

/// Tag every bridge envelope and notification id is namespaced with.
pub const MESSAGE_NAMESPACE: &str = "xPostTracker";
