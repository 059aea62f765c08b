use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use post_tracker_core_types::{
    event::opposite_event_id, Classification, Clock, DateKey, DayCounters, GoalAchieved,
    RuntimeSignal, TrackedEvent,
};
use post_tracker_event_bus::SignalBus;
use post_tracker_state_store::{StateStore, StorageItems, StorageKey};

use crate::baseline::BaselineReconciler;
use crate::config::LedgerConfig;
use crate::errors::LedgerResult;
use crate::goals::evaluate_goals;
use crate::memory::{MemoryChanges, MemoryEntry, RecentEventMemory};

/// What recording one event did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// The identity was already recorded; nothing changed.
    Duplicate { event_id: String },
    Applied(AppliedEvent),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedEvent {
    pub event_id: String,
    pub classification: Classification,
    pub delta: i64,
    /// Day the delta was applied to.
    pub date_key: DateKey,
    /// Remembered identity this event retracted, if any.
    pub retracted: Option<String>,
    pub counters: DayCounters,
    pub goals_reached: Vec<GoalAchieved>,
}

/// Turns tracked events into deduplicated, durable per-day counter changes.
pub struct EventLedger {
    store: Arc<dyn StateStore>,
    signals: Arc<SignalBus>,
    clock: Arc<dyn Clock>,
    memory: Mutex<RecentEventMemory>,
    baseline: Option<BaselineReconciler>,
    config: LedgerConfig,
}

impl EventLedger {
    pub fn new(
        config: LedgerConfig,
        store: Arc<dyn StateStore>,
        signals: Arc<SignalBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            memory: Mutex::new(RecentEventMemory::with_capacity(config.memory_capacity)),
            store,
            signals,
            clock,
            baseline: None,
            config,
        }
    }

    /// Ensures today's baseline before each event is applied.
    pub fn with_reconciler(mut self, reconciler: BaselineReconciler) -> Self {
        self.baseline = Some(reconciler);
        self
    }

    pub fn reconciler(&self) -> Option<&BaselineReconciler> {
        self.baseline.as_ref()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn remembered(&self) -> usize {
        self.memory.lock().await.len()
    }

    /// Records one event. Events are applied one at a time; a storage failure
    /// leaves both the store and the recent-event memory untouched.
    pub async fn record(&self, event: TrackedEvent) -> LedgerResult<LedgerOutcome> {
        if self.config.ensure_baseline {
            if let Some(reconciler) = &self.baseline {
                if let Err(err) = reconciler.ensure().await {
                    debug!(target: "activity-ledger", error = %err, "baseline unavailable; continuing");
                }
            }
        }

        let mut memory = self.memory.lock().await;
        let event_id = event.identity();
        if memory.contains(&event_id) {
            debug!(target: "activity-ledger", %event_id, "duplicate event ignored");
            return Ok(LedgerOutcome::Duplicate { event_id });
        }

        let mut changes = MemoryChanges::default();
        let mut date_key = event.date_key();
        let mut retracted = None;
        if event.delta < 0 {
            let target = event
                .undo_of
                .clone()
                .filter(|id| !id.is_empty())
                .or_else(|| opposite_event_id(&event_id));
            match target {
                Some(target) => match memory.get(&target) {
                    Some(entry) => {
                        date_key = entry.date_key;
                        changes.forget.push(target.clone());
                        retracted = Some(target);
                    }
                    None => {
                        debug!(target: "activity-ledger", %event_id, undo_of = %target, "undo target not remembered");
                    }
                },
                None => {
                    debug!(target: "activity-ledger", %event_id, "undo without a known target");
                }
            }
        } else if let Some(opposite) = opposite_event_id(&event_id) {
            if memory.contains(&opposite) {
                changes.forget.push(opposite);
            }
        }
        changes.remember = Some((
            event_id.clone(),
            MemoryEntry {
                date_key,
                classification: event.classification,
            },
        ));

        let (counters, goals_reached) = self.persist(&event, date_key).await?;
        changes.commit(&mut memory);
        drop(memory);

        info!(
            target: "activity-ledger",
            %event_id,
            classification = %event.classification,
            delta = event.delta,
            %date_key,
            value = counters.get(event.classification),
            "event applied"
        );
        self.signals.publish(RuntimeSignal::Update);
        for reached in &goals_reached {
            info!(
                target: "activity-ledger",
                goal = %reached.goal,
                achieved = reached.achieved,
                date_key = %reached.date_key,
                "goal reached"
            );
            self.signals
                .publish(RuntimeSignal::GoalAchieved(reached.clone()));
        }

        Ok(LedgerOutcome::Applied(AppliedEvent {
            event_id,
            classification: event.classification,
            delta: event.delta,
            date_key,
            retracted,
            counters,
            goals_reached,
        }))
    }

    async fn persist(
        &self,
        event: &TrackedEvent,
        date_key: DateKey,
    ) -> LedgerResult<(DayCounters, Vec<GoalAchieved>)> {
        let result = self.write_counters(event, date_key).await;
        if let Err(err) = &result {
            warn!(target: "activity-ledger", %date_key, error = %err, "failed to persist counters");
        }
        result
    }

    async fn write_counters(
        &self,
        event: &TrackedEvent,
        date_key: DateKey,
    ) -> LedgerResult<(DayCounters, Vec<GoalAchieved>)> {
        let items = self
            .store
            .get(&[
                StorageKey::DailyCounts,
                StorageKey::Goals,
                StorageKey::GoalNotifications,
            ])
            .await?;
        let mut daily = items.daily_counts()?;
        let goals = items.goals();
        let mut notifications = items.goal_notifications()?;

        let counters = daily.entry(date_key).or_default();
        counters.apply_delta(event.classification, event.delta);
        let counters = *counters;

        let flags = notifications.entry(date_key).or_default();
        let reached = evaluate_goals(&goals, &counters, flags, date_key);

        let mut update = StorageItems::new();
        update.set_daily_counts(&daily)?;
        update.set_goal_notifications(&notifications)?;
        self.store.set(update).await?;
        Ok((counters, reached))
    }
}
