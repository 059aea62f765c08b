//! Durable key-value store shared by the tracker logic and the summary views.
//!
//! The store holds one JSON value per [`StorageKey`]. Reads return a
//! [`StorageItems`] bag with typed accessors; writes take a bag and apply every
//! key in it as one atomic step, so a counter update and its notification
//! flags never land separately.

mod file;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use post_tracker_core_types::{
    BaselineSnapshot, DailyCounts, DateKey, GoalConfig, GoalNotifications,
};

pub use file::FileStateStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone, Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(String),
    #[error("stored `{key}` is malformed: {reason}")]
    Malformed { key: StorageKey, reason: String },
    #[error("store file is corrupt: {0}")]
    Corrupt(String),
    #[error("serialize `{key}`: {reason}")]
    Serialize { key: StorageKey, reason: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum StorageKey {
    DailyCounts,
    Goals,
    GoalNotifications,
    Baseline,
}

impl StorageKey {
    pub const ALL: [StorageKey; 4] = [
        Self::DailyCounts,
        Self::Goals,
        Self::GoalNotifications,
        Self::Baseline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DailyCounts => "dailyCounts",
            Self::Goals => "goals",
            Self::GoalNotifications => "goalNotifications",
            Self::Baseline => "baseline",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type BaselineSnapshots = BTreeMap<DateKey, BaselineSnapshot>;

/// A set of key/value pairs read from or about to be written to the store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StorageItems {
    values: BTreeMap<StorageKey, Value>,
}

impl StorageItems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self, key: StorageKey) -> Option<&Value> {
        self.values.get(&key)
    }

    pub fn insert_raw(&mut self, key: StorageKey, value: Value) {
        self.values.insert(key, value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StorageKey, &Value)> {
        self.values.iter().map(|(key, value)| (*key, value))
    }

    fn decode<T: DeserializeOwned + Default>(&self, key: StorageKey) -> StoreResult<T> {
        match self.values.get(&key) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(value) => {
                serde_json::from_value(value.clone()).map_err(|err| StoreError::Malformed {
                    key,
                    reason: err.to_string(),
                })
            }
        }
    }

    fn encode<T: Serialize>(&mut self, key: StorageKey, value: &T) -> StoreResult<()> {
        let encoded = serde_json::to_value(value).map_err(|err| StoreError::Serialize {
            key,
            reason: err.to_string(),
        })?;
        self.values.insert(key, encoded);
        Ok(())
    }

    pub fn daily_counts(&self) -> StoreResult<DailyCounts> {
        self.decode(StorageKey::DailyCounts)
    }

    pub fn set_daily_counts(&mut self, counts: &DailyCounts) -> StoreResult<()> {
        self.encode(StorageKey::DailyCounts, counts)
    }

    /// Goals are read leniently; bad values fall back to the defaults.
    pub fn goals(&self) -> GoalConfig {
        GoalConfig::from_stored(self.values.get(&StorageKey::Goals))
    }

    pub fn set_goals(&mut self, goals: &GoalConfig) -> StoreResult<()> {
        self.encode(StorageKey::Goals, goals)
    }

    pub fn goal_notifications(&self) -> StoreResult<GoalNotifications> {
        self.decode(StorageKey::GoalNotifications)
    }

    pub fn set_goal_notifications(&mut self, flags: &GoalNotifications) -> StoreResult<()> {
        self.encode(StorageKey::GoalNotifications, flags)
    }

    pub fn baseline(&self) -> StoreResult<BaselineSnapshots> {
        self.decode(StorageKey::Baseline)
    }

    pub fn set_baseline(&mut self, snapshots: &BaselineSnapshots) -> StoreResult<()> {
        self.encode(StorageKey::Baseline, snapshots)
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Reads the requested keys; absent keys are simply missing from the result.
    async fn get(&self, keys: &[StorageKey]) -> StoreResult<StorageItems>;

    /// Writes every item as one atomic step. Keys not in `items` are untouched.
    async fn set(&self, items: StorageItems) -> StoreResult<()>;
}

/// Process-local store for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryStateStore {
    values: Mutex<Map<String, Value>>,
}

impl InMemoryStateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Full document, keyed by wire names.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.values.lock().clone()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, keys: &[StorageKey]) -> StoreResult<StorageItems> {
        let guard = self.values.lock();
        Ok(select(&guard, keys))
    }

    async fn set(&self, items: StorageItems) -> StoreResult<()> {
        let mut guard = self.values.lock();
        apply(&mut guard, items);
        Ok(())
    }
}

pub(crate) fn select(document: &Map<String, Value>, keys: &[StorageKey]) -> StorageItems {
    let mut items = StorageItems::new();
    for key in keys {
        if let Some(value) = document.get(key.as_str()) {
            items.insert_raw(*key, value.clone());
        }
    }
    items
}

pub(crate) fn apply(document: &mut Map<String, Value>, items: StorageItems) {
    for (key, value) in items.values {
        document.insert(key.as_str().to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use post_tracker_core_types::{Classification, DayCounters};
    use serde_json::json;

    #[tokio::test]
    async fn set_is_visible_to_get() {
        let store = InMemoryStateStore::new();
        let key = DateKey::from_ymd(2024, 6, 1).unwrap();
        let mut counts = DailyCounts::new();
        let mut day = DayCounters::default();
        day.apply_delta(Classification::Reply, 1);
        counts.insert(key, day);

        let mut items = StorageItems::new();
        items.set_daily_counts(&counts).unwrap();
        store.set(items).await.unwrap();

        let read = store
            .get(&[StorageKey::DailyCounts, StorageKey::Goals])
            .await
            .unwrap();
        assert_eq!(read.daily_counts().unwrap()[&key].replies, 1);
        assert!(read.raw(StorageKey::Goals).is_none());
        assert_eq!(read.goals(), GoalConfig::default());
        assert!(store.snapshot().contains_key("dailyCounts"));
    }

    #[tokio::test]
    async fn malformed_values_surface_as_errors() {
        let store = InMemoryStateStore::new();
        let mut items = StorageItems::new();
        items.insert_raw(StorageKey::DailyCounts, json!(["not", "a", "map"]));
        store.set(items).await.unwrap();

        let read = store.get(&[StorageKey::DailyCounts]).await.unwrap();
        assert!(matches!(
            read.daily_counts(),
            Err(StoreError::Malformed {
                key: StorageKey::DailyCounts,
                ..
            })
        ));
    }
}
