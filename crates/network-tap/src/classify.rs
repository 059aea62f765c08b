//! Pure request/response classification.
//!
//! Nothing here fails: unparseable input degrades to a `post` classification
//! or to "no identifier found".

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;
use url::form_urlencoded;

use post_tracker_core_types::Classification;

/// Depth limit for [`find_id_candidate`].
pub const MAX_SEARCH_DEPTH: usize = 32;
/// Visited-node limit for [`find_id_candidate`].
pub const MAX_SEARCH_NODES: usize = 4_096;

static TWEET_ID_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)tweet.*id").unwrap());
static TARGET_ID_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)target.*id").unwrap());
static NUMERIC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5,}$").unwrap());

const FORM_REPLY_FIELDS: [&str; 2] = ["in_reply_to_status_id", "in_reply_to_tweet_id"];
const FORM_ID_FIELDS: [&str; 4] = ["tweet_id", "tweetId", "source_tweet_id", "id"];
const BODY_ID_POINTERS: [&str; 7] = [
    "/variables/tweet_id",
    "/variables/tweetId",
    "/variables/tweet/rest_id",
    "/variables/target/tweet_id",
    "/variables/target/tweetId",
    "/tweet_id",
    "/tweetId",
];

enum BodyShape {
    Json(Value),
    Form(String),
    Empty,
}

fn parse_body(body: Option<&str>) -> BodyShape {
    let Some(trimmed) = body.map(str::trim).filter(|text| !text.is_empty()) else {
        return BodyShape::Empty;
    };
    if trimmed.starts_with('{') {
        match serde_json::from_str(trimmed) {
            Ok(json) => BodyShape::Json(json),
            Err(err) => {
                debug!(target: "network-tap", error = %err, "failed parsing JSON request body");
                BodyShape::Empty
            }
        }
    } else {
        BodyShape::Form(trimmed.to_string())
    }
}

/// JavaScript-style truthiness for JSON values.
pub(crate) fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Number(number)) => number.as_f64().map_or(true, |n| n != 0.0),
        Some(_) => true,
    }
}

fn first_truthy<'a>(candidates: impl IntoIterator<Item = Option<&'a Value>>) -> Option<&'a Value> {
    candidates.into_iter().find(|value| truthy(*value)).flatten()
}

/// Text form of an identifier-looking value.
fn id_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Decides whether a create-content request is a reply or a post.
pub fn classify_body(body: Option<&str>) -> Classification {
    match parse_body(body) {
        BodyShape::Json(json) => classify_json(&json),
        BodyShape::Form(form) => {
            let is_reply = form_urlencoded::parse(form.as_bytes())
                .any(|(key, _)| FORM_REPLY_FIELDS.contains(&key.as_ref()));
            if is_reply {
                Classification::Reply
            } else {
                Classification::Post
            }
        }
        BodyShape::Empty => Classification::Post,
    }
}

fn classify_json(payload: &Value) -> Classification {
    if !truthy(Some(payload)) {
        return Classification::Post;
    }
    let variables = first_truthy([
        payload.get("variables"),
        payload.get("postTweetRequest"),
        Some(payload),
    ])
    .unwrap_or(payload);
    let reply = first_truthy([
        variables.get("reply"),
        variables.pointer("/postTweetRequest/reply"),
    ]);
    if let Some(reply) = reply {
        let targeted = ["in_reply_to_tweet_id", "in_reply_to_status_id", "conversation_id"]
            .iter()
            .any(|field| truthy(reply.get(field)));
        if targeted {
            return Classification::Reply;
        }
    }
    if truthy(variables.get("in_reply_to_status_id")) || truthy(variables.get("in_reply_to_tweet_id")) {
        return Classification::Reply;
    }
    Classification::Post
}

/// Finds the identifier of newly created content in a create-content response.
pub fn extract_created_id(response: &Value) -> Option<String> {
    let graph = response.pointer("/data/create_tweet/tweet_results/result");
    if let Some(graph) = graph.filter(|value| truthy(Some(value))) {
        return id_text(first_truthy([
            graph.get("rest_id"),
            graph.pointer("/result/rest_id"),
            graph.pointer("/tweet/rest_id"),
        ]));
    }
    let timeline_entry = response.pointer("/data/tweetCreateTimelineEntry");
    if let Some(entry) = timeline_entry.filter(|value| truthy(Some(value))) {
        let result = entry.pointer("/tweet_results/result");
        return id_text(first_truthy([
            result.and_then(|r| r.get("rest_id")),
            result.and_then(|r| r.pointer("/result/rest_id")),
        ]));
    }
    id_text(first_truthy([
        response.get("id_str"),
        response.pointer("/data/create_tweet/tweet_id"),
    ]))
}

/// Finds the target item of a like/repost request from its body.
pub fn parse_target_id(body: Option<&str>) -> Option<String> {
    match parse_body(body) {
        BodyShape::Json(json) => BODY_ID_POINTERS
            .iter()
            .find_map(|pointer| {
                let value = json.pointer(pointer);
                if truthy(value) {
                    id_text(value)
                } else {
                    None
                }
            })
            .or_else(|| find_id_candidate(&json)),
        BodyShape::Form(form) => {
            let pairs: Vec<(String, String)> = form_urlencoded::parse(form.as_bytes())
                .into_owned()
                .collect();
            FORM_ID_FIELDS.iter().find_map(|field| {
                pairs
                    .iter()
                    .find(|(key, _)| key == field)
                    .map(|(_, value)| value.clone())
                    .filter(|value| !value.is_empty())
            })
        }
        BodyShape::Empty => None,
    }
}

/// Depth-first search for the first id-looking field: a key matching
/// `tweet*id` / `target*id`, or a plain `id` holding at least five digits.
/// Arrays are scanned in order, objects in enumeration order. Gives up once
/// [`MAX_SEARCH_DEPTH`] or [`MAX_SEARCH_NODES`] is exceeded.
pub fn find_id_candidate(value: &Value) -> Option<String> {
    let mut nodes_left = MAX_SEARCH_NODES;
    search(value, 0, &mut nodes_left)
}

fn search(value: &Value, depth: usize, nodes_left: &mut usize) -> Option<String> {
    if depth > MAX_SEARCH_DEPTH || *nodes_left == 0 {
        return None;
    }
    *nodes_left -= 1;
    match value {
        Value::Array(items) => items
            .iter()
            .find_map(|item| search(item, depth + 1, nodes_left)),
        Value::Object(map) => {
            for (key, raw) in map {
                if matches!(raw, Value::String(_) | Value::Number(_)) && truthy(Some(raw)) {
                    if let Some(text) = id_text(Some(raw)) {
                        let plain_id = key.eq_ignore_ascii_case("id") && NUMERIC_ID.is_match(&text);
                        if TWEET_ID_KEY.is_match(key) || TARGET_ID_KEY.is_match(key) || plain_id {
                            return Some(text);
                        }
                    }
                }
                if matches!(raw, Value::Object(_) | Value::Array(_)) {
                    if let Some(found) = search(raw, depth + 1, nodes_left) {
                        return Some(found);
                    }
                }
            }
            None
        }
        _ => None,
    }
}
