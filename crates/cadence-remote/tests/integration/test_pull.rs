//! Integration tests for the pull endpoint
//!
//! - Full resync omits `since`
//! - Incremental pull sends `since`
//! - Cursor metadata and tombstones survive decoding
//! - HTTP failures map onto `ProtocolError`

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use cadence_core::domain::{Collection, SyncToken};
use cadence_core::ports::{ISyncProtocol, ProtocolError};
use cadence_remote::{ApiClient, HttpSyncProtocol};

use crate::common;

#[tokio::test]
async fn test_full_resync_omits_since() {
    let (server, protocol) = common::setup_sync_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/sync/v1/notes"))
        .and(header("authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [common::note_entry(1, "a", 100, false)],
            "meta": { "since": null, "max_stamp": 100, "timestamp": 120 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = protocol
        .pull(Collection::Notes, None)
        .await
        .expect("Full pull failed");

    assert_eq!(response.entries.len(), 1);
    assert_eq!(response.entries[0].id().as_str(), "1");
    assert_eq!(response.meta.next_token(), SyncToken::new(100).unwrap());

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].url.query().is_none());
}

#[tokio::test]
async fn test_incremental_pull_sends_since() {
    let (server, protocol) = common::setup_sync_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/sync/v1/content_likes"))
        .and(query_param("since", "500"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                common::note_entry(3, "x", 600, true)
            ],
            "meta": { "since": 500, "timestamp": 700 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = protocol
        .pull(Collection::ContentLikes, Some(SyncToken::new(500).unwrap()))
        .await
        .expect("Incremental pull failed");

    assert!(response.entries[0].is_tombstone());
    assert_eq!(response.meta.since, Some(SyncToken::new(500).unwrap()));
    // No max_stamp: the server time becomes the cursor.
    assert_eq!(response.meta.next_token(), SyncToken::new(700).unwrap());
}

#[tokio::test]
async fn test_pull_throttled_carries_retry_after() {
    let (server, protocol) = common::setup_sync_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/sync/v1/notes"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = protocol.pull(Collection::Notes, None).await.unwrap_err();
    assert_eq!(
        err,
        ProtocolError::Throttled {
            retry_after: Some(Duration::from_secs(7))
        }
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_pull_status_classification() {
    let cases = [
        (401, "unauthorized"),
        (403, "unauthorized"),
        (404, "rejected"),
        (422, "rejected"),
        (500, "server"),
        (503, "server"),
    ];

    for (status, expected) in cases {
        let (server, protocol) = common::setup_sync_mock().await;
        Mock::given(method("GET"))
            .and(path("/api/sync/v1/notes"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = protocol.pull(Collection::Notes, None).await.unwrap_err();
        let kind = match &err {
            ProtocolError::Unauthorized(_) => "unauthorized",
            ProtocolError::Rejected { .. } => "rejected",
            ProtocolError::Server { .. } => "server",
            other => panic!("unexpected error for {status}: {other:?}"),
        };
        assert_eq!(kind, expected, "status {status}");
        assert_eq!(err.is_retryable(), status >= 500, "status {status}");
    }
}

#[tokio::test]
async fn test_pull_malformed_body() {
    let (server, protocol) = common::setup_sync_mock().await;

    Mock::given(method("GET"))
        .and(path("/api/sync/v1/notes"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"data\": 12}"))
        .mount(&server)
        .await;

    let err = protocol.pull(Collection::Notes, None).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Malformed(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_pull_unreachable_host() {
    // Nothing listens on port 9 on the loopback interface.
    let client = ApiClient::with_base_url("http://127.0.0.1:9", common::signed_in());
    let protocol = HttpSyncProtocol::new(client);

    let err = protocol.pull(Collection::Notes, None).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Unreachable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_pull_without_session_sends_nothing() {
    let server = wiremock::MockServer::start().await;
    let client = ApiClient::with_base_url(server.uri(), Arc::new(common::FixedSession(None)));
    let protocol = HttpSyncProtocol::new(client);

    let err = protocol.pull(Collection::Notes, None).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Unauthorized(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ping_reports_reachability() {
    let (server, protocol) = common::setup_sync_mock().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    assert!(protocol.client().ping().await);

    let offline = ApiClient::with_base_url("http://127.0.0.1:9", common::signed_in());
    assert!(!offline.ping().await);
}
