//! `ISyncProtocol` adapter over the HTTP sync API

use async_trait::async_trait;

use cadence_core::domain::{Collection, PullResponse, PushPayload, PushResponse, SyncToken};
use cadence_core::ports::{ISyncProtocol, ProtocolError};

use crate::client::ApiClient;
use crate::{pull, push};

/// HTTP implementation of the sync protocol port
#[derive(Clone)]
pub struct HttpSyncProtocol {
    client: ApiClient,
}

impl HttpSyncProtocol {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

#[async_trait]
impl ISyncProtocol for HttpSyncProtocol {
    async fn pull(
        &self,
        collection: Collection,
        since: Option<SyncToken>,
    ) -> Result<PullResponse, ProtocolError> {
        pull::pull(&self.client, collection, since).await
    }

    async fn push(
        &self,
        collection: Collection,
        payload: PushPayload,
    ) -> Result<PushResponse, ProtocolError> {
        push::push(&self.client, collection, payload).await
    }
}
