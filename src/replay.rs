//! Drives recorded page calls through a running [`Pipeline`].
//!
//! A recording is JSON lines, one call per line:
//!
//! ```text
//! {"mechanism":"fetch","method":"POST","url":"https://x.com/i/api/graphql/q/CreateTweet",
//!  "body":{"variables":{"tweet_text":"hi"}},"status":200,
//!  "response":{"data":{"create_tweet":{"tweet_results":{"result":{"rest_id":"1"}}}}}}
//! ```
//!
//! `body` may be a string, a JSON value (sent as its text) or `{"form": [[k, v], ...]}`.
//! A call with `error` set fails in transport and never gets a response.
//! Blank lines and lines starting with `#` are skipped.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use network_tap::{
    CallMechanism, InterceptedResponse, OutgoingRequest, RequestBody, ResponseBody,
};

use crate::pipeline::{Pipeline, PipelineSnapshot};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum RecordedBody {
    Text(String),
    Form { form: Vec<(String, String)> },
    Json(Value),
}

#[derive(Clone, Debug, Deserialize)]
pub struct RecordedCall {
    #[serde(default = "default_mechanism")]
    pub mechanism: CallMechanism,
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<RecordedBody>,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_mechanism() -> CallMechanism {
    CallMechanism::Fetch
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_status() -> u16 {
    200
}

impl RecordedCall {
    pub fn request(&self) -> OutgoingRequest {
        let body = match &self.body {
            None => RequestBody::Empty,
            Some(RecordedBody::Text(text)) => RequestBody::Text(text.clone()),
            Some(RecordedBody::Form { form }) => RequestBody::UrlEncoded(form.clone()),
            Some(RecordedBody::Json(value)) => RequestBody::Text(value.to_string()),
        };
        self.headers.iter().fold(
            OutgoingRequest::new(self.mechanism, self.method.clone(), self.url.clone()).body(body),
            |request, (name, value)| request.header(name.clone(), value.clone()),
        )
    }

    pub fn outcome(&self) -> Result<InterceptedResponse, String> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        Ok(match &self.response {
            Some(value) => InterceptedResponse::json(self.status, value.clone()),
            None => InterceptedResponse::new(self.status, ResponseBody::Empty),
        })
    }
}

pub fn parse_recording(text: &str) -> Result<Vec<RecordedCall>, ReplayError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|err| ReplayError::Parse {
                line: idx + 1,
                reason: err.to_string(),
            })
        })
        .collect()
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub calls: usize,
    pub transport_errors: usize,
    pub settled: bool,
    pub pipeline: PipelineSnapshot,
}

/// Sends every call through the pipeline's tap in order, then waits up to
/// `settle` for the pipeline to go idle. Each call is classified before the
/// next one is sent so events reach the ledger in recording order.
pub async fn replay(pipeline: &Pipeline, calls: &[RecordedCall], settle: Duration) -> ReplayReport {
    let mut transport_errors = 0;
    for (idx, call) in calls.iter().enumerate() {
        let outcome = call.outcome();
        let result = pipeline
            .tap()
            .intercept(call.request(), |_| async move { outcome })
            .await;
        match result {
            Ok(response) => {
                debug!(target: "post-tracker", call = idx, status = response.status, "replayed call");
            }
            Err(err) => {
                debug!(target: "post-tracker", call = idx, error = %err, "replayed transport failure");
                transport_errors += 1;
            }
        }
        if !pipeline.settle_tap(settle).await {
            break;
        }
    }
    let settled = pipeline.settle(settle).await;
    let snapshot = pipeline.snapshot();
    info!(
        target: "post-tracker",
        calls = calls.len(),
        applied = snapshot.applied,
        duplicates = snapshot.duplicates,
        settled,
        "replay finished"
    );
    ReplayReport {
        calls: calls.len(),
        transport_errors,
        settled,
        pipeline: snapshot,
    }
}
