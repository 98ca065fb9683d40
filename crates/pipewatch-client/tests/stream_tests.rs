//! Integration tests for the push-stream transport.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pipewatch_client::{ClientConfig, LogApiClient};
use pipewatch_core::{BuildId, SourceError, StreamEvent};

/// Keeps the mock server alive for as long as the handle is in use.
async fn open_with_body(body: String) -> (MockServer, pipewatch_core::StreamHandle) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/logs/builds/b1/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let client = LogApiClient::new(ClientConfig::new(server.uri())).expect("client");
    let handle = client.open_stream(&BuildId::from("b1")).await.expect("stream");
    (server, handle)
}

fn frame(message: &str, timestamp: i64) -> String {
    json!({
        "buildId": "b1",
        "events": [{"timestamp": timestamp, "message": message}],
        "timestamp": timestamp
    })
    .to_string()
}

#[tokio::test]
async fn stream_delivers_open_batches_and_close() {
    let body = format!("{}\n{}\n", frame("build start", 100), frame("compiling", 200));
    let (_server, mut handle) = open_with_body(body).await;

    assert!(matches!(handle.next_event().await, Some(StreamEvent::Opened)));

    let first = handle.next_event().await;
    let Some(StreamEvent::Batch(payload)) = first else {
        panic!("expected batch, got {first:?}");
    };
    assert_eq!(payload.events[0].message, "build start");

    let second = handle.next_event().await;
    let Some(StreamEvent::Batch(payload)) = second else {
        panic!("expected batch, got {second:?}");
    };
    assert_eq!(payload.events[0].message, "compiling");

    assert!(matches!(handle.next_event().await, Some(StreamEvent::Closed)));
}

#[tokio::test]
async fn malformed_frames_are_skipped_without_closing() {
    let body = format!("{}\nnot-json\n{}\n", frame("a", 1), frame("b", 2));
    let (_server, mut handle) = open_with_body(body).await;

    assert!(matches!(handle.next_event().await, Some(StreamEvent::Opened)));
    let mut messages = Vec::new();
    while let Some(event) = handle.next_event().await {
        match event {
            StreamEvent::Batch(payload) => messages.push(payload.events[0].message.clone()),
            StreamEvent::Closed => break,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(messages, vec!["a", "b"]);
}

#[tokio::test]
async fn sse_framing_with_data_prefix_is_understood() {
    let body = format!(": keep-alive\ndata: {}\n\n", frame("hello", 5));
    let (_server, mut handle) = open_with_body(body).await;

    assert!(matches!(handle.next_event().await, Some(StreamEvent::Opened)));
    let event = handle.next_event().await;
    let Some(StreamEvent::Batch(payload)) = event else {
        panic!("expected batch, got {event:?}");
    };
    assert_eq!(payload.events[0].message, "hello");
    assert!(matches!(handle.next_event().await, Some(StreamEvent::Closed)));
}

#[tokio::test]
async fn unterminated_final_frame_is_flushed_on_close() {
    // No trailing newline on the last frame.
    let body = frame("tail", 9);
    let (_server, mut handle) = open_with_body(body).await;

    assert!(matches!(handle.next_event().await, Some(StreamEvent::Opened)));
    let event = handle.next_event().await;
    let Some(StreamEvent::Batch(payload)) = event else {
        panic!("expected batch, got {event:?}");
    };
    assert_eq!(payload.events[0].message, "tail");
    assert!(matches!(handle.next_event().await, Some(StreamEvent::Closed)));
}

#[tokio::test]
async fn rejected_stream_surfaces_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/logs/builds/b1/stream"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such build"))
        .mount(&server)
        .await;

    let client = LogApiClient::new(ClientConfig::new(server.uri())).expect("client");
    let err = client.open_stream(&BuildId::from("b1")).await.unwrap_err();
    assert!(matches!(
        err,
        SourceError::Api { status: 404, message, .. } if message == "no such build"
    ));
}

#[tokio::test]
async fn close_stops_event_delivery() {
    let body = format!("{}\n", frame("only", 1));
    let (_server, mut handle) = open_with_body(body).await;

    assert!(matches!(handle.next_event().await, Some(StreamEvent::Opened)));
    handle.close();
    // After close the channel drains whatever the transport already
    // queued, then ends; no hang, no panic.
    while handle.next_event().await.is_some() {}
}
