use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};

use network_tap::{TapError, TimelineSource};
use post_tracker_cli::replay::{parse_recording, replay};
use post_tracker_cli::{AppConfig, Pipeline, TimelineAccess};
use post_tracker_core_types::{Clock, DayCounters, GoalKind, SystemClock};
use post_tracker_state_store::{InMemoryStateStore, StateStore, StorageKey};

const SETTLE: Duration = Duration::from_secs(5);

const SESSION: &str = r#"
# post, reply, like then unlike, repost
{"url":"https://x.com/i/api/graphql/q1/CreateTweet","body":{"variables":{"tweet_text":"hello"}},"response":{"data":{"create_tweet":{"tweet_results":{"result":{"rest_id":"1001"}}}}}}
{"url":"https://x.com/i/api/graphql/q1/CreateTweet","body":{"variables":{"reply":{"in_reply_to_tweet_id":"1001"}}},"response":{"data":{"create_tweet":{"tweet_results":{"result":{"rest_id":"1002"}}}}}}
{"url":"https://x.com/i/api/graphql/q2/FavoriteTweet","body":{"variables":{"tweet_id":"99999"}},"response":{"data":{"favorite_tweet":"Done"}}}
{"url":"https://x.com/i/api/graphql/q3/UnfavoriteTweet","body":{"variables":{"tweet_id":"99999"}},"response":{"data":{"unfavorite_tweet":"Done"}}}
{"mechanism":"xhr","url":"https://x.com/i/api/graphql/q4/CreateRetweet","body":{"variables":{"tweet_id":"55555"}},"response":{}}
{"url":"https://x.com/i/api/graphql/q1/CreateTweet","body":{"variables":{"tweet_text":"hello"}},"response":{"data":{"create_tweet":{"tweet_results":{"result":{"rest_id":"1001"}}}}}}
{"url":"https://x.com/i/api/graphql/q1/CreateTweet","body":{"variables":{"tweet_text":"rejected"}},"status":500}
{"url":"https://x.com/i/api/graphql/q2/FavoriteTweet","body":{"variables":{"tweet_id":"1"}},"error":"offline"}
{"method":"GET","url":"https://x.com/i/api/graphql/q5/HomeTimeline","response":{}}
"#;

fn config(ensure_baseline: bool) -> AppConfig {
    let mut config = AppConfig::default();
    config.ledger.ensure_baseline = ensure_baseline;
    config.ledger.baseline_timeout_ms = 2_000;
    config
}

async fn today_counts(store: &dyn StateStore) -> DayCounters {
    let daily = store
        .get(&[StorageKey::DailyCounts])
        .await
        .unwrap()
        .daily_counts()
        .unwrap();
    daily
        .get(&SystemClock::shared().today())
        .copied()
        .unwrap_or_default()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recorded_session_updates_counters_and_goals() {
    let store = InMemoryStateStore::new();
    let pipeline = Pipeline::start(
        &config(false),
        store.clone(),
        SystemClock::shared(),
        TimelineAccess::Disabled,
    );

    let calls = parse_recording(SESSION).unwrap();
    let report = replay(&pipeline, &calls, SETTLE).await;
    assert!(report.settled);
    assert_eq!(report.calls, 9);
    assert_eq!(report.transport_errors, 1);
    assert_eq!(report.pipeline.tap.observed, 9);
    assert_eq!(report.pipeline.tap.tracked, 8);
    assert_eq!(report.pipeline.tap.dropped, 2);
    assert_eq!(report.pipeline.applied, 5);
    assert_eq!(report.pipeline.duplicates, 1);
    assert_eq!(report.pipeline.failed, 0);

    let counts = today_counts(store.as_ref()).await;
    assert_eq!(
        counts,
        DayCounters {
            posts: 1,
            replies: 1,
            reposts: 1,
            likes: 0,
        }
    );

    let goals: Vec<GoalKind> = pipeline
        .goals_reached()
        .into_iter()
        .map(|reached| reached.goal)
        .collect();
    assert_eq!(goals, vec![GoalKind::Posts, GoalKind::Replies]);

    pipeline.shutdown().await.unwrap();
}

struct FixedTimeline(Vec<Value>);

#[async_trait]
impl TimelineSource for FixedTimeline {
    async fn fetch_timeline(&self) -> Result<Vec<Value>, TapError> {
        Ok(self.0.clone())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn baseline_is_merged_before_the_first_event() {
    let now = Local::now().to_rfc3339();
    let timeline = FixedTimeline(vec![
        json!({ "id_str": "1", "created_at": now }),
        json!({ "id_str": "2", "created_at": now }),
        json!({ "id_str": "3", "created_at": now }),
        json!({ "id_str": "4", "created_at": now, "in_reply_to_status_id_str": "9" }),
        json!({ "id_str": "5", "created_at": "Wed Oct 10 20:19:24 +0000 2018" }),
    ]);
    let store = InMemoryStateStore::new();
    let pipeline = Pipeline::start(
        &config(true),
        store.clone(),
        SystemClock::shared(),
        TimelineAccess::Source(Arc::new(timeline)),
    );

    let calls = parse_recording(
        r#"{"url":"https://x.com/i/api/graphql/q1/CreateTweet","body":{"variables":{"tweet_text":"hi"}},"response":{"id_str":"2001"}}"#,
    )
    .unwrap();
    let report = replay(&pipeline, &calls, SETTLE).await;
    assert!(report.settled);
    assert_eq!(report.pipeline.applied, 1);

    let counts = today_counts(store.as_ref()).await;
    assert_eq!(counts.posts, 4);
    assert_eq!(counts.replies, 1);

    let snapshots = store
        .get(&[StorageKey::Baseline])
        .await
        .unwrap()
        .baseline()
        .unwrap();
    let snapshot = &snapshots[&SystemClock::shared().today()];
    assert!(snapshot.synced);
    assert_eq!(snapshot.counts.posts, 3);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unavailable_timeline_records_an_unsynced_baseline() {
    let store = InMemoryStateStore::new();
    let pipeline = Pipeline::start(
        &config(true),
        store.clone(),
        SystemClock::shared(),
        TimelineAccess::Disabled,
    );

    let outcome = pipeline.reconciler().ensure().await.unwrap();
    assert!(!outcome.synced);
    assert!(!outcome.timed_out);

    let snapshots = store
        .get(&[StorageKey::Baseline])
        .await
        .unwrap()
        .baseline()
        .unwrap();
    assert!(!snapshots[&SystemClock::shared().today()].synced);

    pipeline.shutdown().await.unwrap();
}
