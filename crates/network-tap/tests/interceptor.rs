use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use network_tap::{
    CallMechanism, InterceptedResponse, NetworkTap, OutgoingRequest, RequestBody, ResponseBody,
};
use post_tracker_core_types::Classification;
use serde_json::json;
use tokio::time::timeout;

const CREATE_TWEET: &str = "https://x.com/i/api/graphql/Qm9v/CreateTweet";

#[tokio::test]
async fn response_is_returned_unchanged_and_event_published() {
    let (tap, mut rx) = NetworkTap::new();
    let payload = json!({"data":{"create_tweet":{"tweet_results":{"result":{"rest_id":"4242"}}}}});
    let delivered = InterceptedResponse::json(200, payload.clone());

    let request = OutgoingRequest::new(CallMechanism::Fetch, "POST", CREATE_TWEET)
        .header("Authorization", "Bearer page")
        .body(RequestBody::Text(r#"{"variables":{"tweet_text":"hi"}}"#.into()));
    let returned = tap
        .intercept(request, |sent| {
            let delivered = delivered.clone();
            async move {
                assert_eq!(sent.url, CREATE_TWEET);
                Ok::<_, Infallible>(delivered)
            }
        })
        .await
        .unwrap();
    assert_eq!(returned, InterceptedResponse::json(200, payload));

    let event = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("event in time")
        .expect("event");
    assert_eq!(event.classification, Classification::Post);
    assert_eq!(event.remote_id.as_deref(), Some("4242"));
    assert_eq!(
        tap.auth().current().authorization.as_deref(),
        Some("Bearer page")
    );
}

#[tokio::test]
async fn untracked_calls_pass_through() {
    let (tap, mut rx) = NetworkTap::new();
    let request = OutgoingRequest::new(
        CallMechanism::Fetch,
        "GET",
        "https://x.com/i/api/graphql/Qm9v/HomeTimeline",
    );
    let returned = tap
        .intercept(request, |_| async {
            Ok::<_, Infallible>(InterceptedResponse::new(
                200,
                ResponseBody::Bytes(Bytes::from_static(b"{}")),
            ))
        })
        .await
        .unwrap();
    assert_eq!(returned.status, 200);
    assert!(rx.try_recv().is_err());
    let stats = tap.snapshot();
    assert_eq!(stats.observed, 1);
    assert_eq!(stats.tracked, 0);
}

#[tokio::test]
async fn transport_errors_propagate_without_events() {
    let (tap, mut rx) = NetworkTap::new();
    let request = OutgoingRequest::new(CallMechanism::Xhr, "POST", CREATE_TWEET);
    let outcome = tap
        .intercept(request, |_| async { Err::<InterceptedResponse, _>("offline") })
        .await;
    assert_eq!(outcome.unwrap_err(), "offline");
    tokio::task::yield_now().await;
    assert!(rx.try_recv().is_err());
    let stats = tap.snapshot();
    assert_eq!(stats.tracked, 1);
    assert_eq!(stats.dropped, 1);
}

#[tokio::test]
async fn malformed_response_is_swallowed() {
    let (tap, mut rx) = NetworkTap::new();
    let request = OutgoingRequest::new(CallMechanism::Xhr, "POST", CREATE_TWEET)
        .body(RequestBody::Text("{not json".into()));
    let returned = tap
        .intercept(request, |_| async {
            Ok::<_, Infallible>(InterceptedResponse::new(
                200,
                ResponseBody::Bytes(Bytes::from_static(b"<html>")),
            ))
        })
        .await
        .unwrap();
    assert_eq!(returned.status, 200);

    for _ in 0..20 {
        if tap.snapshot().dropped == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(tap.snapshot().dropped, 1);
    assert!(rx.try_recv().is_err());
}
