//! One-hop typed relay between the page context and the tracker logic.
//!
//! Messages travel as `{source, type, payload}` envelopes on a shared channel,
//! the way window messages do. Receivers only surface envelopes that carry the
//! configured source tag, a known type and a payload that decodes; everything
//! else is dropped without error.

pub mod config;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use post_tracker_core_types::{DateKey, DayCounters, TrackedEvent, MESSAGE_NAMESPACE};

pub use crate::config::{BridgeConfig, SOURCE_TAG};

/// Raw envelope as posted on the channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MessageType {
    TweetDetected,
    BaselineRequest,
    BaselineResponse,
}

impl MessageType {
    pub const ALL: [MessageType; 3] = [
        MessageType::TweetDetected,
        MessageType::BaselineRequest,
        MessageType::BaselineResponse,
    ];

    fn suffix(&self) -> &'static str {
        match self {
            MessageType::TweetDetected => "tweetDetected",
            MessageType::BaselineRequest => "baselineRequest",
            MessageType::BaselineResponse => "baselineResponse",
        }
    }

    pub fn wire_name(&self) -> String {
        format!("{MESSAGE_NAMESPACE}:{}", self.suffix())
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        let (namespace, suffix) = raw.split_once(':')?;
        if namespace != MESSAGE_NAMESPACE {
            return None;
        }
        Self::ALL.into_iter().find(|kind| kind.suffix() == suffix)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineRequest {
    pub key: DateKey,
}

/// Page-side answer to a [`BaselineRequest`], correlated by `key`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineResponse {
    pub key: DateKey,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub counts: DayCounters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BaselineResponse {
    pub fn success(key: DateKey, counts: DayCounters) -> Self {
        Self {
            key,
            success: true,
            counts,
            error: None,
        }
    }

    pub fn failure(key: DateKey, error: impl Into<String>) -> Self {
        Self {
            key,
            success: false,
            counts: DayCounters::default(),
            error: Some(error.into()),
        }
    }
}

/// Decoded bridge message.
#[derive(Clone, Debug, PartialEq)]
pub enum BridgeMessage {
    TweetDetected(TrackedEvent),
    BaselineRequest(BaselineRequest),
    BaselineResponse(BaselineResponse),
}

impl BridgeMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            BridgeMessage::TweetDetected(_) => MessageType::TweetDetected,
            BridgeMessage::BaselineRequest(_) => MessageType::BaselineRequest,
            BridgeMessage::BaselineResponse(_) => MessageType::BaselineResponse,
        }
    }

    fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            BridgeMessage::TweetDetected(event) => serde_json::to_value(event),
            BridgeMessage::BaselineRequest(request) => serde_json::to_value(request),
            BridgeMessage::BaselineResponse(response) => serde_json::to_value(response),
        }
    }

    fn decode(kind: MessageType, payload: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            MessageType::TweetDetected => BridgeMessage::TweetDetected(serde_json::from_value(payload)?),
            MessageType::BaselineRequest => {
                BridgeMessage::BaselineRequest(serde_json::from_value(payload)?)
            }
            MessageType::BaselineResponse => {
                BridgeMessage::BaselineResponse(serde_json::from_value(payload)?)
            }
        })
    }
}

/// Errors surfaced by the bridge.
#[derive(Clone, Debug, Error)]
pub enum BridgeError {
    #[error("failed to encode {kind:?} payload: {reason}")]
    Encode { kind: MessageType, reason: String },
    #[error("no message pending")]
    Empty,
    #[error("channel closed")]
    ChannelClosed,
}

/// Posting side of the relay. Posting never fails for lack of listeners.
pub trait Bridge: Send + Sync {
    /// Returns how many receivers the message reached.
    fn post(&self, message: BridgeMessage) -> Result<usize, BridgeError>;
    fn subscribe(&self) -> BridgeReceiver;
}

pub struct EventBridge {
    sender: broadcast::Sender<Envelope>,
    config: BridgeConfig,
}

impl EventBridge {
    pub fn new(config: BridgeConfig) -> Arc<Self> {
        let (sender, _) = broadcast::channel(config.capacity.max(1));
        Arc::new(Self { sender, config })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Posts an arbitrary envelope, as any script sharing the channel could.
    pub fn post_raw(&self, envelope: Envelope) -> usize {
        match self.sender.send(envelope) {
            Ok(count) => count,
            Err(_) => {
                trace!(target: "extensions-bridge", "no bridge listeners");
                0
            }
        }
    }
}

impl Bridge for EventBridge {
    fn post(&self, message: BridgeMessage) -> Result<usize, BridgeError> {
        let kind = message.message_type();
        let payload = message.payload().map_err(|err| BridgeError::Encode {
            kind,
            reason: err.to_string(),
        })?;
        Ok(self.post_raw(Envelope {
            source: self.config.source_tag.clone(),
            kind: kind.wire_name(),
            payload,
        }))
    }

    fn subscribe(&self) -> BridgeReceiver {
        BridgeReceiver {
            inner: self.sender.subscribe(),
            source_tag: self.config.source_tag.clone(),
        }
    }
}

/// Receiving side; yields decoded messages in posting order.
pub struct BridgeReceiver {
    inner: broadcast::Receiver<Envelope>,
    source_tag: String,
}

impl BridgeReceiver {
    /// Next recognised message, or `None` once every poster is gone.
    pub async fn recv(&mut self) -> Option<BridgeMessage> {
        loop {
            match self.inner.recv().await {
                Ok(envelope) => {
                    if let Some(message) = self.accept(envelope) {
                        return Some(message);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target: "extensions-bridge", skipped, "bridge receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`BridgeReceiver::recv`].
    pub fn try_recv(&mut self) -> Result<BridgeMessage, BridgeError> {
        loop {
            match self.inner.try_recv() {
                Ok(envelope) => {
                    if let Some(message) = self.accept(envelope) {
                        return Ok(message);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(target: "extensions-bridge", skipped, "bridge receiver lagged");
                }
                Err(broadcast::error::TryRecvError::Empty) => return Err(BridgeError::Empty),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(BridgeError::ChannelClosed)
                }
            }
        }
    }

    fn accept(&self, envelope: Envelope) -> Option<BridgeMessage> {
        if envelope.source != self.source_tag {
            trace!(target: "extensions-bridge", source = %envelope.source, "foreign envelope ignored");
            return None;
        }
        let Some(kind) = MessageType::from_wire(&envelope.kind) else {
            trace!(target: "extensions-bridge", kind = %envelope.kind, "unknown message type ignored");
            return None;
        };
        match BridgeMessage::decode(kind, envelope.payload) {
            Ok(message) => Some(message),
            Err(err) => {
                trace!(target: "extensions-bridge", ?kind, error = %err, "undecodable payload ignored");
                None
            }
        }
    }
}
