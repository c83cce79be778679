//! Push of locally pending records
//!
//! `POST /api/sync/v1/{collection}` with `{ entries }` answers
//! `{ results }`, one result per entry, matched by id.

use reqwest::Method;
use tracing::debug;

use cadence_core::domain::{Collection, PushPayload, PushResponse, PushResult};
use cadence_core::ports::ProtocolError;

use crate::client::ApiClient;
use crate::pull::collection_path;

/// Submits pending records of `collection`
pub async fn push(
    client: &ApiClient,
    collection: Collection,
    payload: PushPayload,
) -> Result<PushResponse, ProtocolError> {
    let submitted = payload.entries.len();
    let request = client
        .request(Method::POST, &collection_path(collection))?
        .json(&payload);

    let response: PushResponse = client.send_json(request).await?;

    let failures = response
        .results
        .iter()
        .filter(|r| matches!(r, PushResult::Failure { .. }))
        .count();
    debug!(
        collection = %collection,
        submitted,
        results = response.results.len(),
        failures,
        "Pushed collection"
    );

    Ok(response)
}
