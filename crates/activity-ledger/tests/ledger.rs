use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone, Utc};
use tokio::sync::broadcast;

use post_tracker_core_types::{
    Classification, DailyCounts, DateKey, Direction, GoalKind, ManualClock, RuntimeSignal,
    TrackedEvent,
};
use post_tracker_event_bus::{EventBus, InMemoryBus, SignalBus};
use post_tracker_ledger::{EventLedger, LedgerConfig, LedgerError, LedgerOutcome};
use post_tracker_state_store::{
    InMemoryStateStore, StateStore, StorageItems, StorageKey, StoreError, StoreResult,
};

fn noon(day: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 6, day, 12, 0, 0).single().unwrap()
}

fn at(day: u32, minute: u32) -> DateTime<Utc> {
    (noon(day) + chrono::Duration::minutes(minute as i64)).with_timezone(&Utc)
}

fn key(day: u32) -> DateKey {
    DateKey::from_ymd(2024, 6, day).unwrap()
}

struct Harness {
    ledger: EventLedger,
    store: Arc<dyn StateStore>,
    signals: broadcast::Receiver<RuntimeSignal>,
}

fn harness_with_store(store: Arc<dyn StateStore>) -> Harness {
    let bus: Arc<SignalBus> = InMemoryBus::new(64);
    let signals = bus.subscribe();
    let clock = ManualClock::new(noon(1));
    let ledger = EventLedger::new(LedgerConfig::default(), Arc::clone(&store), bus, clock);
    Harness {
        ledger,
        store,
        signals,
    }
}

fn harness() -> Harness {
    harness_with_store(InMemoryStateStore::new())
}

impl Harness {
    async fn daily(&self) -> DailyCounts {
        self.store
            .get(&[StorageKey::DailyCounts])
            .await
            .unwrap()
            .daily_counts()
            .unwrap()
    }

    fn drain(&mut self) -> Vec<RuntimeSignal> {
        let mut seen = Vec::new();
        while let Ok(signal) = self.signals.try_recv() {
            seen.push(signal);
        }
        seen
    }
}

fn like(id: &str, direction: Direction, day: u32) -> TrackedEvent {
    TrackedEvent::for_remote(Classification::Like, id, direction, at(day, 0))
}

#[tokio::test]
async fn like_then_unlike_restores_previous_value() {
    let h = harness();
    h.ledger.record(like("1", Direction::Create, 1)).await.unwrap();
    h.ledger.record(like("999", Direction::Create, 1)).await.unwrap();
    assert_eq!(h.daily().await[&key(1)].likes, 2);

    let unlike = TrackedEvent {
        event_id: None,
        classification: Classification::Like,
        remote_id: Some("999".into()),
        delta: -1,
        timestamp: at(1, 5),
        undo_of: Some("like:999:pos".into()),
    };
    match h.ledger.record(unlike).await.unwrap() {
        LedgerOutcome::Applied(applied) => {
            assert_eq!(applied.retracted.as_deref(), Some("like:999:pos"));
            assert_eq!(applied.counters.likes, 1);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.daily().await[&key(1)].likes, 1);
}

#[tokio::test]
async fn redelivery_is_a_no_op() {
    let mut h = harness();
    let event = TrackedEvent::for_remote(Classification::Post, "77", Direction::Create, at(1, 0));
    h.ledger.record(event.clone()).await.unwrap();
    let before = h.daily().await;
    let signals_before = h.drain();

    let outcome = h.ledger.record(event).await.unwrap();
    assert_eq!(
        outcome,
        LedgerOutcome::Duplicate {
            event_id: "post:77:pos".into()
        }
    );
    assert_eq!(h.daily().await, before);
    assert!(h.drain().is_empty());
    assert!(signals_before.contains(&RuntimeSignal::Update));
}

#[tokio::test]
async fn undo_targets_the_day_of_the_undone_action() {
    let h = harness();
    h.ledger.record(like("5", Direction::Create, 1)).await.unwrap();
    h.ledger.record(like("5", Direction::Delete, 2)).await.unwrap();

    let daily = h.daily().await;
    assert_eq!(daily[&key(1)].likes, 0);
    assert!(daily.get(&key(2)).map_or(true, |day| day.likes == 0));
}

#[tokio::test]
async fn unmatched_undo_clamps_at_zero() {
    let h = harness();
    let outcome = h
        .ledger
        .record(like("404", Direction::Delete, 3))
        .await
        .unwrap();
    match outcome {
        LedgerOutcome::Applied(applied) => {
            assert_eq!(applied.retracted, None);
            assert_eq!(applied.date_key, key(3));
            assert_eq!(applied.counters.likes, 0);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn undo_of_evicted_action_falls_back_to_its_own_day() {
    let h = harness();
    let capacity = LedgerConfig::default().memory_capacity;
    assert_eq!(capacity, 400);
    for id in 0..=capacity {
        h.ledger
            .record(like(&id.to_string(), Direction::Create, 1))
            .await
            .unwrap();
    }
    h.ledger
        .record(like(&(capacity + 1).to_string(), Direction::Create, 1))
        .await
        .unwrap();
    assert_eq!(h.ledger.remembered().await, capacity);
    let day_one = (capacity + 2) as u64;
    assert_eq!(h.daily().await[&key(1)].likes, day_one);

    match h.ledger.record(like("0", Direction::Delete, 2)).await.unwrap() {
        LedgerOutcome::Applied(applied) => {
            assert_eq!(applied.retracted, None);
            assert_eq!(applied.date_key, key(2));
            assert_eq!(applied.counters.likes, 0);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    h.ledger.record(like("fresh", Direction::Create, 2)).await.unwrap();
    assert_eq!(h.daily().await[&key(2)].likes, 1);
    h.ledger.record(like("1", Direction::Delete, 2)).await.unwrap();

    let daily = h.daily().await;
    assert_eq!(daily[&key(2)].likes, 0);
    assert_eq!(daily[&key(1)].likes, day_one);
}

#[tokio::test]
async fn like_unlike_like_counts_once() {
    let h = harness();
    h.ledger.record(like("8", Direction::Create, 1)).await.unwrap();
    h.ledger.record(like("8", Direction::Delete, 1)).await.unwrap();
    h.ledger.record(like("8", Direction::Create, 1)).await.unwrap();
    assert_eq!(h.daily().await[&key(1)].likes, 1);
    assert_eq!(h.ledger.remembered().await, 1);
}

#[tokio::test]
async fn goal_fires_once_per_day() {
    let mut h = harness();
    let post = |id: &str, day| {
        TrackedEvent::for_remote(Classification::Post, id, Direction::Create, at(day, 0))
    };

    h.ledger.record(post("a", 1)).await.unwrap();
    h.ledger.record(post("b", 1)).await.unwrap();
    h.ledger.record(post("c", 2)).await.unwrap();

    let reached: Vec<_> = h
        .drain()
        .into_iter()
        .filter_map(|signal| match signal {
            RuntimeSignal::GoalAchieved(goal) => Some(goal),
            RuntimeSignal::Update => None,
        })
        .collect();
    assert_eq!(reached.len(), 2);
    assert!(reached.iter().all(|goal| goal.goal == GoalKind::Posts));
    assert_eq!(reached[0].date_key, key(1));
    assert_eq!(reached[0].achieved, 1);
    assert_eq!(reached[1].date_key, key(2));

    let flags = h
        .store
        .get(&[StorageKey::GoalNotifications])
        .await
        .unwrap()
        .goal_notifications()
        .unwrap();
    assert_eq!(flags[&key(1)][&GoalKind::Posts], true);
    assert_eq!(flags[&key(1)][&GoalKind::Replies], false);
}

#[tokio::test]
async fn independent_events_commute() {
    let events = vec![
        TrackedEvent::for_remote(Classification::Post, "1", Direction::Create, at(1, 0)),
        TrackedEvent::for_remote(Classification::Reply, "2", Direction::Create, at(1, 1)),
        TrackedEvent::for_remote(Classification::Repost, "3", Direction::Create, at(1, 2)),
        TrackedEvent::for_remote(Classification::Like, "4", Direction::Create, at(2, 0)),
        TrackedEvent::for_remote(Classification::Post, "5", Direction::Create, at(2, 3)),
    ];

    let forward = harness();
    for event in events.iter().cloned() {
        forward.ledger.record(event).await.unwrap();
    }
    let backward = harness();
    for event in events.iter().rev().cloned() {
        backward.ledger.record(event).await.unwrap();
    }
    assert_eq!(forward.daily().await, backward.daily().await);
}

struct FlakyStore {
    inner: Arc<InMemoryStateStore>,
    fail_writes: AtomicBool,
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn get(&self, keys: &[StorageKey]) -> StoreResult<StorageItems> {
        self.inner.get(keys).await
    }

    async fn set(&self, items: StorageItems) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io("disk full".into()));
        }
        self.inner.set(items).await
    }
}

#[tokio::test]
async fn failed_write_leaves_memory_untouched() {
    let store = Arc::new(FlakyStore {
        inner: InMemoryStateStore::new(),
        fail_writes: AtomicBool::new(true),
    });
    let h = harness_with_store(store.clone());
    let event = TrackedEvent::for_remote(Classification::Post, "9", Direction::Create, at(1, 0));

    let err = h.ledger.record(event.clone()).await.unwrap_err();
    assert!(matches!(err, LedgerError::Store(StoreError::Io(_))));
    assert_eq!(h.ledger.remembered().await, 0);
    assert!(h.daily().await.is_empty());

    store.fail_writes.store(false, Ordering::SeqCst);
    assert!(matches!(
        h.ledger.record(event).await.unwrap(),
        LedgerOutcome::Applied(_)
    ));
    assert_eq!(h.daily().await[&key(1)].posts, 1);
}
