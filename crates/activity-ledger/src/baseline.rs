//! Once-per-day reconciliation against the platform's own totals.
//!
//! The first caller for a day key starts the reconciliation; everyone else
//! awaits the same shared outcome until the day changes. A day that already
//! has a synced snapshot resolves from storage. Otherwise a
//! `baselineRequest` goes out on the bridge and the caller waits for the
//! matching `baselineResponse`, up to the configured timeout. A timed-out day
//! keeps its outcome until the retry backoff has passed. A storage failure
//! clears the memo so the next caller retries.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use extensions_bridge::{BaselineRequest, BaselineResponse, Bridge, BridgeMessage};
use post_tracker_core_types::{BaselineSnapshot, Clock, DateKey, DayCounters, RuntimeSignal};
use post_tracker_event_bus::SignalBus;
use post_tracker_state_store::{StateStore, StorageItems, StorageKey};

use crate::errors::{LedgerError, LedgerResult};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineOutcome {
    pub synced: bool,
    #[serde(rename = "timeout", default, skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<DayCounters>,
}

impl BaselineOutcome {
    pub fn timed_out() -> Self {
        Self {
            synced: false,
            timed_out: true,
            counts: None,
        }
    }
}

type SharedOutcome = Shared<BoxFuture<'static, LedgerResult<BaselineOutcome>>>;

struct Memo {
    key: DateKey,
    generation: u64,
    outcome: SharedOutcome,
    /// Set once the request timed out.
    retry_after: Option<DateTime<Local>>,
}

impl Memo {
    fn reusable(&self, key: DateKey, now: DateTime<Local>) -> bool {
        self.key == key && self.retry_after.map_or(true, |at| now < at)
    }
}

struct Pending {
    key: DateKey,
    generation: u64,
    reply: oneshot::Sender<LedgerResult<BaselineOutcome>>,
}

#[derive(Default)]
struct ReconcilerState {
    generation: u64,
    memo: Option<Memo>,
    pending: Option<Pending>,
}

impl ReconcilerState {
    fn clear_memo(&mut self, generation: u64) {
        if self.memo.as_ref().map(|memo| memo.generation) == Some(generation) {
            self.memo = None;
        }
    }

    fn back_off(&mut self, generation: u64, until: Option<DateTime<Local>>) {
        if let Some(memo) = self.memo.as_mut().filter(|memo| memo.generation == generation) {
            memo.retry_after = until;
        }
    }

    fn clear_pending(&mut self, generation: u64) {
        if self.pending.as_ref().map(|pending| pending.generation) == Some(generation) {
            self.pending = None;
        }
    }
}

struct Inner {
    store: Arc<dyn StateStore>,
    signals: Arc<SignalBus>,
    bridge: Arc<dyn Bridge>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    retry_backoff: Duration,
    state: Mutex<ReconcilerState>,
}

#[derive(Clone)]
pub struct BaselineReconciler {
    inner: Arc<Inner>,
}

impl BaselineReconciler {
    pub fn new(
        store: Arc<dyn StateStore>,
        signals: Arc<SignalBus>,
        bridge: Arc<dyn Bridge>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                signals,
                bridge,
                clock,
                timeout,
                retry_backoff,
                state: Mutex::new(ReconcilerState::default()),
            }),
        }
    }

    /// Day key of the request currently awaiting a response.
    pub fn pending_key(&self) -> Option<DateKey> {
        self.inner.state.lock().pending.as_ref().map(|pending| pending.key)
    }

    /// Reconciles today, sharing any reconciliation already under way.
    pub async fn ensure(&self) -> LedgerResult<BaselineOutcome> {
        let now = self.inner.clock.now();
        let key = DateKey::for_instant(&now);
        let outcome = {
            let mut state = self.inner.state.lock();
            match &state.memo {
                Some(memo) if memo.reusable(key, now) => memo.outcome.clone(),
                _ => {
                    state.generation += 1;
                    let generation = state.generation;
                    let outcome = initiate(Arc::clone(&self.inner), key, generation)
                        .boxed()
                        .shared();
                    state.memo = Some(Memo {
                        key,
                        generation,
                        outcome: outcome.clone(),
                        retry_after: None,
                    });
                    outcome
                }
            }
        };
        outcome.await
    }

    /// Applies a page answer. Answers for anything but the pending day key are
    /// ignored and yield `Ok(false)`.
    pub async fn handle_response(&self, response: BaselineResponse) -> LedgerResult<bool> {
        let pending = {
            let mut state = self.inner.state.lock();
            match &state.pending {
                Some(pending) if pending.key == response.key => state.pending.take(),
                _ => None,
            }
        };
        let Some(pending) = pending else {
            debug!(
                target: "activity-ledger",
                key = %response.key,
                "baseline response without matching request ignored"
            );
            return Ok(false);
        };

        let result = apply_response(&self.inner, &response).await;
        if let Err(err) = &result {
            warn!(target: "activity-ledger", key = %response.key, error = %err, "failed applying baseline");
            self.inner.state.lock().clear_memo(pending.generation);
        }
        // The waiter may have timed out in the meantime.
        let _ = pending.reply.send(result.clone());
        result.map(|_| true)
    }
}

async fn initiate(
    inner: Arc<Inner>,
    key: DateKey,
    generation: u64,
) -> LedgerResult<BaselineOutcome> {
    let stored = match inner.store.get(&[StorageKey::Baseline]).await {
        Ok(items) => items.baseline(),
        Err(err) => Err(err),
    };
    let snapshots = match stored {
        Ok(snapshots) => snapshots,
        Err(err) => {
            inner.state.lock().clear_memo(generation);
            return Err(err.into());
        }
    };
    if let Some(snapshot) = snapshots.get(&key).filter(|snapshot| snapshot.synced) {
        debug!(target: "activity-ledger", %key, "baseline already synced");
        return Ok(BaselineOutcome {
            synced: true,
            timed_out: false,
            counts: Some(snapshot.counts),
        });
    }

    let (reply, waiter) = oneshot::channel();
    inner.state.lock().pending = Some(Pending {
        key,
        generation,
        reply,
    });
    if let Err(err) = inner
        .bridge
        .post(BridgeMessage::BaselineRequest(BaselineRequest { key }))
    {
        let mut state = inner.state.lock();
        state.clear_pending(generation);
        state.clear_memo(generation);
        return Err(LedgerError::Bridge(err.to_string()));
    }
    debug!(target: "activity-ledger", %key, "baseline requested");

    match tokio::time::timeout(inner.timeout, waiter).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => {
            inner.state.lock().clear_memo(generation);
            Err(LedgerError::Superseded)
        }
        Err(_) => {
            warn!(
                target: "activity-ledger",
                %key,
                timeout_ms = inner.timeout.as_millis() as u64,
                retry_ms = inner.retry_backoff.as_millis() as u64,
                "baseline timed out"
            );
            let retry_at = chrono::Duration::from_std(inner.retry_backoff)
                .ok()
                .and_then(|backoff| inner.clock.now().checked_add_signed(backoff));
            let mut state = inner.state.lock();
            state.clear_pending(generation);
            state.back_off(generation, retry_at);
            Ok(BaselineOutcome::timed_out())
        }
    }
}

async fn apply_response(inner: &Inner, response: &BaselineResponse) -> LedgerResult<BaselineOutcome> {
    let items = inner
        .store
        .get(&[StorageKey::DailyCounts, StorageKey::Baseline])
        .await?;
    let mut daily = items.daily_counts()?;
    let mut snapshots = items.baseline()?;

    let entry = daily.entry(response.key).or_default();
    entry.merge_max(&response.counts);
    let merged = *entry;
    snapshots.insert(
        response.key,
        BaselineSnapshot {
            synced: response.success,
            timestamp: inner.clock.now().with_timezone(&Utc),
            counts: merged,
        },
    );

    let mut update = StorageItems::new();
    update.set_daily_counts(&daily)?;
    update.set_baseline(&snapshots)?;
    inner.store.set(update).await?;

    info!(
        target: "activity-ledger",
        key = %response.key,
        synced = response.success,
        posts = merged.posts,
        replies = merged.replies,
        reposts = merged.reposts,
        likes = merged.likes,
        "baseline merged"
    );
    if let Some(error) = response.error.as_deref() {
        warn!(target: "activity-ledger", key = %response.key, error, "page reported baseline failure");
    }
    inner.signals.publish(RuntimeSignal::Update);

    Ok(BaselineOutcome {
        synced: response.success,
        timed_out: false,
        counts: Some(response.counts),
    })
}
