//! Integration tests for the push endpoint
//!
//! - Request body carries `{ entries }` with the deleted flag
//! - Mixed success and failure results are returned per record

use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use cadence_core::domain::{
    Collection, EntryIds, PushEntry, PushEntryMeta, PushPayload, PushResult, RecordId,
    FAILURE_TYPE_INVALID,
};
use cadence_core::ports::{ISyncProtocol, ProtocolError};

use crate::common;

fn payload() -> PushPayload {
    PushPayload {
        entries: vec![
            PushEntry {
                record: serde_json::json!({ "content_id": 1, "value": "edited" }),
                meta: PushEntryMeta {
                    ids: EntryIds {
                        id: RecordId::from(1u64),
                    },
                    deleted: false,
                },
            },
            PushEntry {
                record: serde_json::json!({ "content_id": 2, "value": "" }),
                meta: PushEntryMeta {
                    ids: EntryIds {
                        id: RecordId::from(2u64),
                    },
                    deleted: true,
                },
            },
        ],
    }
}

#[tokio::test]
async fn test_push_returns_per_record_results() {
    let (server, protocol) = common::setup_sync_mock().await;

    Mock::given(method("POST"))
        .and(path("/api/sync/v1/notes"))
        .and(body_partial_json(serde_json::json!({
            "entries": [
                { "meta": { "ids": { "id": "1" }, "deleted": false } },
                { "meta": { "ids": { "id": "2" }, "deleted": true } }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [
                {
                    "type": "failure",
                    "failure_type": "invalid",
                    "ids": { "id": 2 },
                    "errors": { "value": ["must not be blank"] }
                },
                {
                    "type": "success",
                    "entry": common::note_entry(1, "edited", 300, false)
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = protocol
        .push(Collection::Notes, payload())
        .await
        .expect("Push failed");

    assert_eq!(response.results.len(), 2);

    // Results are matched by id, not position.
    let failure = response
        .results
        .iter()
        .find(|r| r.id().as_str() == "2")
        .unwrap();
    match failure {
        PushResult::Failure {
            failure_type,
            errors,
            ..
        } => {
            assert_eq!(failure_type, FAILURE_TYPE_INVALID);
            let errors = errors.as_ref().unwrap();
            assert_eq!(errors["value"], vec!["must not be blank".to_string()]);
        }
        other => panic!("expected failure, got {other:?}"),
    }

    let success = response
        .results
        .iter()
        .find(|r| r.id().as_str() == "1")
        .unwrap();
    assert!(matches!(success, PushResult::Success { .. }));
}

#[tokio::test]
async fn test_push_server_error_is_retryable() {
    let (server, protocol) = common::setup_sync_mock().await;

    Mock::given(method("POST"))
        .and(path("/api/sync/v1/practices"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = protocol
        .push(Collection::Practices, payload())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProtocolError::Server {
            status: 502,
            message: "bad gateway".to_string()
        }
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_push_rejected_request_is_not_retryable() {
    let (server, protocol) = common::setup_sync_mock().await;

    Mock::given(method("POST"))
        .and(path("/api/sync/v1/notes"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let err = protocol.push(Collection::Notes, payload()).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Rejected { status: 400, .. }));
    assert!(!err.is_retryable());
}
