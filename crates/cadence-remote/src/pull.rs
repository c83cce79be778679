//! Incremental pull of one collection
//!
//! `GET /api/sync/v1/{collection}?since={token}` returns every entry changed
//! since the token. The `since` parameter is omitted for a full resync.

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use cadence_core::domain::{Collection, PullMeta, PullResponse, SyncEntry, SyncToken};
use cadence_core::ports::ProtocolError;

use crate::client::ApiClient;

/// Path of a collection's sync endpoint
pub fn collection_path(collection: Collection) -> String {
    format!("/api/sync/v1/{}", collection.as_str())
}

/// Pull response as sent on the wire
#[derive(Debug, Deserialize)]
struct PullBody {
    data: Vec<SyncEntry<Value>>,
    meta: PullMeta,
}

impl From<PullBody> for PullResponse {
    fn from(body: PullBody) -> Self {
        PullResponse {
            entries: body.data,
            meta: body.meta,
        }
    }
}

/// Fetches the entries of `collection` changed since `since`
pub async fn pull(
    client: &ApiClient,
    collection: Collection,
    since: Option<SyncToken>,
) -> Result<PullResponse, ProtocolError> {
    let mut request = client.request(Method::GET, &collection_path(collection))?;
    if let Some(token) = since {
        request = request.query(&[("since", token.as_secs())]);
    }

    let body: PullBody = client.send_json(request).await?;

    debug!(
        collection = %collection,
        since = ?since.map(|t| t.as_secs()),
        entries = body.data.len(),
        max_stamp = ?body.meta.max_stamp.map(|t| t.as_secs()),
        timestamp = body.meta.timestamp.as_secs(),
        "Pulled collection"
    );

    Ok(body.into())
}
