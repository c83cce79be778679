//! Shared test helpers for sync API integration tests
//!
//! Provides a wiremock server plus an `HttpSyncProtocol` pointing at it,
//! authenticated with a fixed test session.

use std::sync::Arc;

use wiremock::MockServer;

use cadence_core::ports::{Listener, Session, SessionProvider, Subscription};
use cadence_remote::{ApiClient, HttpSyncProtocol};

pub const TEST_TOKEN: &str = "test-access-token";

/// Session provider that always returns the same session
pub struct FixedSession(pub Option<Session>);

impl SessionProvider for FixedSession {
    fn current(&self) -> Option<Session> {
        self.0.clone()
    }

    fn on_change(&self, _listener: Listener<Option<Session>>) -> Subscription {
        Subscription::noop()
    }
}

pub fn signed_in() -> Arc<dyn SessionProvider> {
    Arc::new(FixedSession(Some(Session {
        user_id: 42,
        access_token: TEST_TOKEN.to_string(),
    })))
}

/// Starts a mock server and returns a protocol adapter bound to it
pub async fn setup_sync_mock() -> (MockServer, HttpSyncProtocol) {
    let server = MockServer::start().await;
    let client = ApiClient::with_base_url(server.uri(), signed_in());
    (server, HttpSyncProtocol::new(client))
}

/// A wire entry for the notes collection
pub fn note_entry(id: u64, value: &str, updated_at: i64, deleted: bool) -> serde_json::Value {
    let deleted_at = if deleted {
        serde_json::json!(updated_at)
    } else {
        serde_json::Value::Null
    };
    serde_json::json!({
        "record": { "content_id": id, "value": value },
        "meta": {
            "ids": { "id": id },
            "lifecycle": {
                "created_at": 1,
                "updated_at": updated_at,
                "deleted_at": deleted_at
            }
        }
    })
}
