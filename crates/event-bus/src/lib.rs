use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use post_tracker_core_types::RuntimeSignal;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

/// Best-effort publish/subscribe. Publishing never fails the publisher: with
/// nobody listening the event is simply dropped.
pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    /// Returns how many subscribers the event reached.
    fn publish(&self, event: E) -> usize;
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// Bus for the logic side's `update` / `goalAchieved` signals.
pub type SignalBus = dyn EventBus<RuntimeSignal>;

/// Simple in-memory bus backed by a broadcast channel.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }
}

impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    fn publish(&self, event: E) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(dropped)) => {
                trace!(target: "event-bus", event = ?dropped, "no listener; signal dropped");
                0
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Helper to materialise an mpsc receiver from the bus subscription
/// so callers can await events without handling broadcast semantics directly.
pub fn to_mpsc<E>(bus: Arc<dyn EventBus<E>>, capacity: usize) -> mpsc::Receiver<E>
where
    E: Event,
{
    let mut rx = bus.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    if tx.send(ev).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!(target: "event-bus", skipped, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    out_rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use post_tracker_core_types::{DateKey, GoalAchieved, GoalKind};

    #[tokio::test]
    async fn publish_without_listener_is_not_an_error() {
        let bus = InMemoryBus::<RuntimeSignal>::new(4);
        assert_eq!(bus.publish(RuntimeSignal::Update), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let bus = InMemoryBus::<RuntimeSignal>::new(4);
        let mut rx = bus.subscribe();
        let achieved = RuntimeSignal::GoalAchieved(GoalAchieved {
            goal: GoalKind::Replies,
            achieved: 2,
            date_key: DateKey::from_ymd(2024, 5, 1).unwrap(),
        });
        assert_eq!(bus.publish(RuntimeSignal::Update), 1);
        bus.publish(achieved.clone());
        assert_eq!(rx.recv().await.unwrap(), RuntimeSignal::Update);
        assert_eq!(rx.recv().await.unwrap(), achieved);
    }

    #[tokio::test]
    async fn mpsc_adapter_forwards_signals() {
        let bus = InMemoryBus::<RuntimeSignal>::new(4);
        let mut rx = to_mpsc(bus.clone() as Arc<dyn EventBus<RuntimeSignal>>, 4);
        // the forwarding task subscribes synchronously inside to_mpsc
        bus.publish(RuntimeSignal::Update);
        assert_eq!(rx.recv().await, Some(RuntimeSignal::Update));
    }
}
