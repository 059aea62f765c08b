//! Goal notifications raised from `goalAchieved` signals.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use post_tracker_core_types::{GoalAchieved, RuntimeSignal, MESSAGE_NAMESPACE};
use post_tracker_event_bus::{to_mpsc, SignalBus};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Stable per goal and day so a repeat replaces rather than stacks.
    pub id: String,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn for_goal(reached: &GoalAchieved) -> Self {
        let noun = if reached.achieved == 1 {
            reached.goal.singular()
        } else {
            reached.goal.as_str()
        };
        Self {
            id: format!(
                "{MESSAGE_NAMESPACE}:goal:{}:{}",
                reached.goal.as_str(),
                reached.date_key
            ),
            title: format!("Goal reached: {}", reached.goal.label()),
            body: format!(
                "You've met your {} goal with {} {noun} today.",
                reached.goal.as_str(),
                reached.achieved
            ),
        }
    }
}

/// Where notifications end up.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, notification: Notification) {
        info!(
            target: "post-tracker",
            id = %notification.id,
            title = %notification.title,
            "{}",
            notification.body
        );
    }
}

/// Keeps every notification, for reports and tests.
#[derive(Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        LogSink.notify(notification.clone());
        self.seen.lock().push(notification);
    }
}

/// Background task turning `goalAchieved` signals into notifications.
/// The task stops when the handle is dropped.
pub struct Notifier {
    task: JoinHandle<()>,
}

impl Notifier {
    /// Subscribes immediately, so signals published after this returns are seen.
    pub fn spawn(signals: Arc<SignalBus>, sink: Arc<dyn NotificationSink>) -> Self {
        let mut rx = to_mpsc(signals, 32);
        let task = tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                match signal {
                    RuntimeSignal::GoalAchieved(reached) => {
                        sink.notify(Notification::for_goal(&reached));
                    }
                    RuntimeSignal::Update => {
                        debug!(target: "post-tracker", "counters updated");
                    }
                }
            }
        });
        Self { task }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.task.abort();
    }
}
