//! Integration tests for the REST surface against a fake backend.

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pipewatch_client::{ClientConfig, LogApiClient};
use pipewatch_core::types::SearchRequest;
use pipewatch_core::{BuildId, LogLevel, LogQuery, LogSourceKind, SourceError};

fn client_for(server: &MockServer) -> LogApiClient {
    LogApiClient::new(ClientConfig::new(server.uri())).expect("client")
}

#[tokio::test]
async fn start_collection_posts_and_accepts_ack() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/logs/builds/b1/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.start_collection(&BuildId::from("b1")).await.expect("start");
}

#[tokio::test]
async fn start_collection_surfaces_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/logs/builds/b1/start"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "collector at capacity"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.start_collection(&BuildId::from("b1")).await.unwrap_err();
    assert!(matches!(
        err,
        SourceError::Api { message, .. } if message == "collector at capacity"
    ));
}

#[tokio::test]
async fn non_2xx_maps_to_typed_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/logs/builds/b1/status"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "code": "collector_down",
            "message": "log collector unavailable"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.status(&BuildId::from("b1")).await.unwrap_err();
    match err {
        SourceError::Api { status, code, message, .. } => {
            assert_eq!(status, 503);
            assert_eq!(code.as_deref(), Some("collector_down"));
            assert_eq!(message, "log collector unavailable");
        }
        other => panic!("expected api error, got {other:?}"),
    }
    assert!(client.status(&BuildId::from("b1")).await.unwrap_err().is_retryable());
}

#[tokio::test]
async fn retry_after_header_is_captured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/logs/builds/b1/stop"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.stop_collection(&BuildId::from("b1")).await.unwrap_err();
    assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(7)));
}

#[tokio::test]
async fn status_decodes_collection_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/logs/builds/b1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "buildId": "b1",
            "isActive": true,
            "startTime": 1_700_000_000_000_i64,
            "logCount": 42,
            "lastUpdate": 1_700_000_060_000_i64
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let status = client.status(&BuildId::from("b1")).await.expect("status");
    assert!(status.is_active);
    assert_eq!(status.log_count, Some(42));
}

#[tokio::test]
async fn recent_logs_sends_limit_and_unwraps_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/logs/builds/b1/recent"))
        .and(query_param("limit", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [
                {"timestamp": 100, "message": "a"},
                {"timestamp": 200, "message": "b", "level": "ERROR"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let events = client.recent_logs(&BuildId::from("b1"), 200).await.expect("recent");
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].level.as_deref(), Some("ERROR"));
}

#[tokio::test]
async fn cached_logs_fetches_full_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/logs/builds/b1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{"timestamp": 1, "message": "hello"}]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let events = client.cached_logs(&BuildId::from("b1")).await.expect("cached");
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn get_logs_forwards_filters_and_decodes_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/logs/b1"))
        .and(query_param("limit", "50"))
        .and(query_param("offset", "100"))
        .and(query_param("levels", "ERROR,WARN"))
        .and(query_param("search", "timeout"))
        .and(query_param("regex", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "logs": [{"timestamp": 5, "message": "timeout", "level": "ERROR"}],
            "source": "archive",
            "pagination": {"offset": 100, "limit": 50, "total": 151, "hasMore": true},
            "metadata": {
                "totalLines": 151,
                "errorCount": 3,
                "warningCount": 9,
                "buildStatus": "FAILED",
                "duration": 93_000
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let query = LogQuery {
        limit: 50,
        offset: 100,
        levels: vec![LogLevel::Error, LogLevel::Warn],
        search: Some("timeout".into()),
        regex: false,
    };
    let page = client.get_logs(&BuildId::from("b1"), &query).await.expect("page");

    assert_eq!(page.source, LogSourceKind::Archive);
    assert!(page.pagination.has_more);
    assert_eq!(page.metadata.unwrap().error_count, 3);
    assert_eq!(page.logs[0].level, LogLevel::Error);
}

#[tokio::test]
async fn get_logs_accepts_realtime_source_label() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/logs/b1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "logs": [],
            "source": "realtime",
            "pagination": {"offset": 0, "limit": 100, "total": 0, "hasMore": false}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let page = client
        .get_logs(&BuildId::from("b1"), &LogQuery::default())
        .await
        .expect("page");
    assert_eq!(page.source, LogSourceKind::Live);
}

#[tokio::test]
async fn search_posts_request_and_decodes_hits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/logs/b1/search"))
        .and(body_partial_json(json!({"query": "exit [0-9]+", "regex": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "lineNumber": 812,
                "level": "ERROR",
                "message": "process exit 137",
                "matches": [{"start": 8, "end": 16}],
                "context": ["previous line", "process exit 137", "next line"]
            }],
            "totalMatches": 1,
            "searchTime": 12
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = SearchRequest {
        query: "exit [0-9]+".into(),
        regex: true,
        levels: vec![],
        include_context: true,
        context_lines: 1,
    };
    let response = client.search(&BuildId::from("b1"), &request).await.expect("search");

    assert_eq!(response.total_matches, 1);
    assert_eq!(response.results[0].line_number, 812);
    assert_eq!(response.results[0].matches[0].start, 8);
}

#[tokio::test]
async fn transport_failure_is_typed_and_retryable() {
    // Nothing is listening on this port.
    let client = LogApiClient::new(ClientConfig::new("http://127.0.0.1:1")).expect("client");
    let err = client.status(&BuildId::from("b1")).await.unwrap_err();
    assert!(matches!(err, SourceError::Transport(_)));
    assert!(err.is_retryable());
}
