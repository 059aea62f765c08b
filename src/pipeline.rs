//! Wires the page side and the logic side together.
//!
//! Page side: the [`NetworkTap`] broadcasts tracked events, a relay task posts
//! them on the bridge as `tweetDetected`, and a responder task answers
//! `baselineRequest` from the timeline. Logic side: one dispatch task reads the
//! bridge in delivery order, queues events for the single ledger worker and
//! routes `baselineResponse` straight to the reconciler so a ledger call that
//! waits on the baseline never blocks the answer it waits for.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use extensions_bridge::{BaselineResponse, Bridge, BridgeMessage, BridgeReceiver, EventBridge};
use network_tap::{
    BaselineCollector, HttpTimelineSource, NetworkTap, SessionInfo, TapSnapshot, TimelineSource,
};
use post_tracker_core_types::{Clock, GoalAchieved, TrackedEvent};
use post_tracker_event_bus::{InMemoryBus, SignalBus};
use post_tracker_ledger::{BaselineReconciler, EventLedger, LedgerOutcome};
use post_tracker_state_store::StateStore;

use crate::config::AppConfig;

/// How the page side answers baseline requests.
pub enum TimelineAccess {
    /// Every request is answered with a failure.
    Disabled,
    /// Authenticated calls against the live timeline endpoint.
    Live(SessionInfo),
    Source(Arc<dyn TimelineSource>),
}

#[derive(Default)]
struct PipelineStats {
    relayed: AtomicU64,
    lost: AtomicU64,
    processed: AtomicU64,
    applied: AtomicU64,
    duplicates: AtomicU64,
    failed: AtomicU64,
    goals_reached: Mutex<Vec<GoalAchieved>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSnapshot {
    pub tap: TapSnapshot,
    pub relayed: u64,
    /// Events lost to channel lag or encode failures.
    pub lost: u64,
    pub processed: u64,
    pub applied: u64,
    pub duplicates: u64,
    pub failed: u64,
}

impl PipelineSnapshot {
    /// True once every tracked call has been resolved and every relayed event
    /// has been through the ledger.
    pub fn is_idle(&self) -> bool {
        self.tap.tracked == self.tap.emitted + self.tap.dropped
            && self.tap.emitted == self.relayed + self.lost
            && self.relayed == self.processed
    }
}

pub struct Pipeline {
    tap: Arc<NetworkTap>,
    bridge: Arc<EventBridge>,
    signals: Arc<SignalBus>,
    ledger: Arc<EventLedger>,
    reconciler: BaselineReconciler,
    store: Arc<dyn StateStore>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Builds every component and starts the background tasks. All
    /// subscriptions are taken before this returns.
    pub fn start(
        config: &AppConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        timeline: TimelineAccess,
    ) -> Self {
        let (tap, tap_rx) = NetworkTap::with_config(config.tap.clone());
        let tap = Arc::new(tap);
        let bridge = EventBridge::new(config.bridge.clone());
        let signals: Arc<SignalBus> = InMemoryBus::new(config.signal_capacity);

        let reconciler = BaselineReconciler::new(
            Arc::clone(&store),
            Arc::clone(&signals),
            bridge.clone(),
            Arc::clone(&clock),
            config.ledger.baseline_timeout(),
            config.ledger.baseline_retry(),
        );
        let ledger = Arc::new(
            EventLedger::new(
                config.ledger.clone(),
                Arc::clone(&store),
                Arc::clone(&signals),
                clock,
            )
            .with_reconciler(reconciler.clone()),
        );

        let collector = match timeline {
            TimelineAccess::Disabled => None,
            TimelineAccess::Live(session) => {
                match HttpTimelineSource::new(config.tap.clone(), tap.auth(), session) {
                    Ok(source) => Some(BaselineCollector::new(Arc::new(source))),
                    Err(err) => {
                        warn!(target: "post-tracker", error = %err, "timeline source unavailable");
                        None
                    }
                }
            }
            TimelineAccess::Source(source) => Some(BaselineCollector::new(source)),
        };

        let stats = Arc::new(PipelineStats::default());
        let cancel = CancellationToken::new();
        // Unbounded so the dispatch task never waits on a ledger that is
        // itself waiting for a baseline response.
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let tasks = vec![
            spawn_relay(tap_rx, bridge.clone(), Arc::clone(&stats), cancel.clone()),
            spawn_dispatch(
                bridge.subscribe(),
                queue_tx,
                reconciler.clone(),
                cancel.clone(),
            ),
            spawn_ledger_worker(
                queue_rx,
                Arc::clone(&ledger),
                Arc::clone(&stats),
                cancel.clone(),
            ),
            spawn_responder(
                bridge.subscribe(),
                bridge.clone(),
                collector.map(Arc::new),
                cancel.clone(),
            ),
        ];
        info!(target: "post-tracker", "pipeline started");

        Self {
            tap,
            bridge,
            signals,
            ledger,
            reconciler,
            store,
            stats,
            cancel,
            tasks,
        }
    }

    pub fn tap(&self) -> &Arc<NetworkTap> {
        &self.tap
    }

    pub fn bridge(&self) -> &Arc<EventBridge> {
        &self.bridge
    }

    pub fn signals(&self) -> Arc<SignalBus> {
        Arc::clone(&self.signals)
    }

    pub fn ledger(&self) -> &Arc<EventLedger> {
        &self.ledger
    }

    pub fn reconciler(&self) -> &BaselineReconciler {
        &self.reconciler
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            tap: self.tap.snapshot(),
            relayed: self.stats.relayed.load(Ordering::Relaxed),
            lost: self.stats.lost.load(Ordering::Relaxed),
            processed: self.stats.processed.load(Ordering::Relaxed),
            applied: self.stats.applied.load(Ordering::Relaxed),
            duplicates: self.stats.duplicates.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    /// Goals the ledger worker has seen reached, in order.
    pub fn goals_reached(&self) -> Vec<GoalAchieved> {
        self.stats.goals_reached.lock().clone()
    }

    /// Waits until the pipeline is idle. Returns `false` if `deadline` passed first.
    pub async fn settle(&self, deadline: Duration) -> bool {
        self.wait_until(deadline, PipelineSnapshot::is_idle).await
    }

    /// Waits until every tracked call has been classified, which fixes the
    /// order its event enters the bridge.
    pub async fn settle_tap(&self, deadline: Duration) -> bool {
        self.wait_until(deadline, |snapshot| {
            snapshot.tap.tracked == snapshot.tap.emitted + snapshot.tap.dropped
        })
        .await
    }

    async fn wait_until<F>(&self, deadline: Duration, ready: F) -> bool
    where
        F: Fn(&PipelineSnapshot) -> bool,
    {
        let started = tokio::time::Instant::now();
        loop {
            let snapshot = self.snapshot();
            if ready(&snapshot) {
                return true;
            }
            if started.elapsed() >= deadline {
                warn!(target: "post-tracker", ?snapshot, "pipeline did not settle");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Stops the background tasks and waits for them to finish.
    pub async fn shutdown(mut self) -> Result<(), tokio::task::JoinError> {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            match task.await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {}
                Err(err) => return Err(err),
            }
        }
        debug!(target: "post-tracker", "pipeline stopped");
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn spawn_relay(
    mut events: broadcast::Receiver<TrackedEvent>,
    bridge: Arc<EventBridge>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = events.recv() => received,
            };
            match received {
                Ok(event) => match bridge.post(BridgeMessage::TweetDetected(event)) {
                    Ok(_) => {
                        stats.relayed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        warn!(target: "post-tracker", error = %err, "failed to relay tracked event");
                        stats.lost.fetch_add(1, Ordering::Relaxed);
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target: "post-tracker", skipped, "tracked event channel lagged");
                    stats.lost.fetch_add(skipped, Ordering::Relaxed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_dispatch(
    mut inbox: BridgeReceiver,
    queue: mpsc::UnboundedSender<TrackedEvent>,
    reconciler: BaselineReconciler,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = inbox.recv() => message,
            };
            match message {
                Some(BridgeMessage::TweetDetected(event)) => {
                    if queue.send(event).is_err() {
                        break;
                    }
                }
                Some(BridgeMessage::BaselineResponse(response)) => {
                    if let Err(err) = reconciler.handle_response(response).await {
                        warn!(target: "post-tracker", error = %err, "baseline response not applied");
                    }
                }
                Some(BridgeMessage::BaselineRequest(_)) => {}
                None => break,
            }
        }
    })
}

fn spawn_ledger_worker(
    mut queue: mpsc::UnboundedReceiver<TrackedEvent>,
    ledger: Arc<EventLedger>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = queue.recv() => event,
            };
            let Some(event) = event else { break };
            match ledger.record(event).await {
                Ok(LedgerOutcome::Applied(applied)) => {
                    stats.applied.fetch_add(1, Ordering::Relaxed);
                    stats.goals_reached.lock().extend(applied.goals_reached);
                }
                Ok(LedgerOutcome::Duplicate { .. }) => {
                    stats.duplicates.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    warn!(target: "post-tracker", error = %err, "failed to record event");
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            stats.processed.fetch_add(1, Ordering::Relaxed);
        }
    })
}

fn spawn_responder(
    mut inbox: BridgeReceiver,
    bridge: Arc<EventBridge>,
    collector: Option<Arc<BaselineCollector>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = inbox.recv() => message,
            };
            let request = match message {
                Some(BridgeMessage::BaselineRequest(request)) => request,
                Some(_) => continue,
                None => break,
            };
            let bridge = bridge.clone();
            let collector = collector.clone();
            tokio::spawn(async move {
                let response = match collector {
                    Some(collector) => match collector.collect(request.key).await {
                        Ok(counts) => BaselineResponse::success(request.key, counts),
                        Err(err) => BaselineResponse::failure(request.key, err.to_string()),
                    },
                    None => BaselineResponse::failure(request.key, "timeline access disabled"),
                };
                debug!(
                    target: "post-tracker",
                    key = %request.key,
                    success = response.success,
                    "answering baseline request"
                );
                if let Err(err) = bridge.post(BridgeMessage::BaselineResponse(response)) {
                    warn!(target: "post-tracker", error = %err, "failed to post baseline response");
                }
            });
        }
    })
}
