//! Page-side network tap.
//!
//! Every outgoing page call is handed to [`NetworkTap`] which checks it against
//! the tracked endpoint table. Untracked calls pass through untouched. Tracked
//! calls have their request body snapshotted before sending; once a successful
//! response arrives the call is classified off the delivery path and a
//! [`TrackedEvent`] is published on the tap's broadcast bus.

pub mod auth;
pub mod classify;
pub mod config;
pub mod endpoints;
pub mod timeline;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, trace};
use url::form_urlencoded;

use post_tracker_core_types::{Direction, TrackedEvent};

use crate::auth::AuthCache;
use crate::classify::{classify_body, extract_created_id, parse_target_id};
use crate::config::TapConfig;
use crate::endpoints::{EndpointMatch, EndpointTable};

pub use crate::timeline::{BaselineCollector, HttpTimelineSource, SessionInfo, TimelineSource};

/// Errors emitted by the tap surface and its baseline collector.
#[derive(Clone, Debug, Error)]
pub enum TapError {
    #[error("session user id is unknown")]
    MissingUserId,
    #[error("remote returned status {status}")]
    Remote { status: u16 },
    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Which page mechanism issued the call.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallMechanism {
    Fetch,
    Xhr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FormValue {
    Text(String),
    File { name: String, content: Bytes },
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormField {
    pub name: String,
    pub value: FormValue,
}

impl FormField {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FormValue::Text(value.into()),
        }
    }
}

/// Request body as the page handed it over. Cloning shares the underlying buffers.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Text(String),
    UrlEncoded(Vec<(String, String)>),
    FormData(Vec<FormField>),
    Binary(Bytes),
}

impl RequestBody {
    /// Text form used for classification. Form fields are url-encoded and file
    /// fields contribute their file name. Non-UTF-8 binary bodies have no text.
    pub fn snapshot_text(&self) -> Option<String> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Text(text) => Some(text.clone()),
            RequestBody::UrlEncoded(pairs) => Some(
                form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs.iter())
                    .finish(),
            ),
            RequestBody::FormData(fields) => {
                let mut serializer = form_urlencoded::Serializer::new(String::new());
                for field in fields {
                    let value = match &field.value {
                        FormValue::Text(text) => text.as_str(),
                        FormValue::File { name, .. } => name.as_str(),
                    };
                    serializer.append_pair(&field.name, value);
                }
                Some(serializer.finish())
            }
            RequestBody::Binary(bytes) => std::str::from_utf8(bytes).ok().map(str::to_string),
        }
    }
}

#[derive(Clone, Debug)]
pub struct OutgoingRequest {
    pub mechanism: CallMechanism,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl OutgoingRequest {
    pub fn new(mechanism: CallMechanism, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            mechanism,
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }
}

/// Response payload as delivered to the page. Cloning never copies the body.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ResponseBody {
    #[default]
    Empty,
    Bytes(Bytes),
    Json(Arc<Value>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterceptedResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl InterceptedResponse {
    pub fn new(status: u16, body: ResponseBody) -> Self {
        Self { status, body }
    }

    pub fn json(status: u16, payload: Value) -> Self {
        Self::new(status, ResponseBody::Json(Arc::new(payload)))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parsed payload; empty or non-JSON bodies yield `None`.
    pub fn payload(&self) -> Option<Arc<Value>> {
        match &self.body {
            ResponseBody::Empty => None,
            ResponseBody::Json(value) => Some(Arc::clone(value)),
            ResponseBody::Bytes(bytes) if bytes.is_empty() => None,
            ResponseBody::Bytes(bytes) => match serde_json::from_slice(bytes) {
                Ok(value) => Some(Arc::new(value)),
                Err(err) => {
                    debug!(target: "network-tap", error = %err, "response body is not json");
                    None
                }
            },
        }
    }
}

/// State carried from [`NetworkTap::begin`] to [`NetworkTap::finish`] for a tracked call.
#[derive(Clone, Debug)]
pub struct TapTicket {
    pub mechanism: CallMechanism,
    pub endpoint: EndpointMatch,
    pub body: Option<String>,
}

/// Cumulative counters exposed via pull-based API.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapSnapshot {
    pub observed: u64,
    pub tracked: u64,
    pub emitted: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct TapStats {
    observed: AtomicU64,
    tracked: AtomicU64,
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl TapStats {
    fn snapshot(&self) -> TapSnapshot {
        TapSnapshot {
            observed: self.observed.load(Ordering::Relaxed),
            tracked: self.tracked.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Broadcast channel for tracked events.
pub type EventBus = broadcast::Sender<TrackedEvent>;

pub struct NetworkTap {
    pub bus: EventBus,
    auth: Arc<AuthCache>,
    endpoints: &'static EndpointTable,
    stats: Arc<TapStats>,
    config: TapConfig,
}

impl NetworkTap {
    pub fn new() -> (Self, broadcast::Receiver<TrackedEvent>) {
        Self::with_config(TapConfig::default())
    }

    pub fn with_config(config: TapConfig) -> (Self, broadcast::Receiver<TrackedEvent>) {
        let (tx, rx) = broadcast::channel(config.buffer.max(1));
        (
            Self {
                bus: tx,
                auth: Arc::new(AuthCache::new()),
                endpoints: EndpointTable::standard(),
                stats: Arc::new(TapStats::default()),
                config,
            },
            rx,
        )
    }

    pub fn config(&self) -> &TapConfig {
        &self.config
    }

    /// Credentials cache shared with the baseline collector.
    pub fn auth(&self) -> Arc<AuthCache> {
        Arc::clone(&self.auth)
    }

    pub fn snapshot(&self) -> TapSnapshot {
        self.stats.snapshot()
    }

    /// Observes a call about to be sent. Returns a ticket only for tracked calls.
    pub fn begin(&self, request: &OutgoingRequest) -> Option<TapTicket> {
        self.stats.observed.fetch_add(1, Ordering::Relaxed);
        self.auth.update_from_headers(&request.headers);
        let endpoint = self.endpoints.detect(&request.method, &request.url)?;
        self.stats.tracked.fetch_add(1, Ordering::Relaxed);
        trace!(
            target: "network-tap",
            mechanism = ?request.mechanism,
            url = %request.url,
            ?endpoint,
            "tracked call"
        );
        Some(TapTicket {
            mechanism: request.mechanism,
            endpoint,
            body: request.body.snapshot_text(),
        })
    }

    /// Hands the response of a tracked call over for classification. Runs on a
    /// spawned task when a runtime is available, inline otherwise.
    pub fn finish(&self, ticket: TapTicket, response: &InterceptedResponse) {
        if !response.is_success() {
            trace!(target: "network-tap", status = response.status, "tracked call failed");
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let response = response.clone();
        let bus = self.bus.clone();
        let stats = Arc::clone(&self.stats);
        let work = move || {
            let event = Self::event_for(&ticket, &response, Utc::now());
            Self::emit(&bus, &stats, &ticket, event);
        };
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { work() });
            }
            Err(_) => work(),
        }
    }

    /// Wraps a call: observes it, forwards it through `send` unchanged and
    /// returns the outcome untouched.
    pub async fn intercept<F, Fut, E>(
        &self,
        request: OutgoingRequest,
        send: F,
    ) -> Result<InterceptedResponse, E>
    where
        F: FnOnce(OutgoingRequest) -> Fut,
        Fut: Future<Output = Result<InterceptedResponse, E>>,
    {
        let ticket = self.begin(&request);
        let outcome = send(request).await;
        match (ticket, outcome.as_ref()) {
            (Some(ticket), Ok(response)) => self.finish(ticket, response),
            (Some(_), Err(_)) => {
                trace!(target: "network-tap", "tracked call failed in transport");
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            (None, _) => {}
        }
        outcome
    }

    /// Event a successful tracked call produces, if any.
    pub fn event_for(
        ticket: &TapTicket,
        response: &InterceptedResponse,
        now: DateTime<Utc>,
    ) -> Option<TrackedEvent> {
        if !response.is_success() {
            return None;
        }
        match ticket.endpoint {
            EndpointMatch::CreateContent => {
                let classification = classify_body(ticket.body.as_deref());
                let payload = response.payload()?;
                let remote_id = extract_created_id(&payload)?;
                Some(TrackedEvent::for_remote(
                    classification,
                    remote_id,
                    Direction::Create,
                    now,
                ))
            }
            EndpointMatch::Secondary { kind, direction } => {
                Some(match parse_target_id(ticket.body.as_deref()) {
                    Some(remote_id) => TrackedEvent::for_remote(kind, remote_id, direction, now),
                    None => TrackedEvent::anonymous(kind, direction, now),
                })
            }
        }
    }

    fn emit(bus: &EventBus, stats: &TapStats, ticket: &TapTicket, event: Option<TrackedEvent>) {
        let Some(event) = event else {
            debug!(
                target: "network-tap",
                mechanism = ?ticket.mechanism,
                "no identifier in tracked response; dropping"
            );
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        debug!(
            target: "network-tap",
            mechanism = ?ticket.mechanism,
            classification = %event.classification,
            delta = event.delta,
            event_id = event.event_id.as_deref().unwrap_or("-"),
            "tracked event"
        );
        if bus.send(event).is_err() {
            trace!(target: "network-tap", "no tracked-event subscribers");
        }
        // Counted after the send so a reader that sees the count also sees the event.
        stats.emitted.fetch_add(1, Ordering::Release);
    }
}
