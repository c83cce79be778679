//! Sync protocol port (driven/secondary port)
//!
//! Defines the interface a remote adapter implements to pull changes for a
//! collection since a cursor, and to push locally pending records.
//!
//! ## Design Notes
//!
//! - Uses a typed [`ProtocolError`] rather than `anyhow` so the retry layer
//!   can tell transient failures from permanent ones.
//! - Request timeouts are the adapter's responsibility.
//! - Record bodies are untyped (`serde_json::Value`); decoding into the
//!   collection's model happens in the sync store.

use std::time::Duration;

use thiserror::Error;

use crate::domain::{Collection, PullResponse, PushPayload, PushResponse, SyncToken};

/// Failures reported by a protocol adapter
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Transport-level failure (DNS, connect, reset, timeout)
    #[error("Remote unreachable: {0}")]
    Unreachable(String),

    /// The server asked the client to slow down
    #[error("Throttled by server (retry after {retry_after:?})")]
    Throttled { retry_after: Option<Duration> },

    /// The server failed to handle the request
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Credentials missing, expired or rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The server refused the request as a whole
    #[error("Request rejected with {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The response could not be understood
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ProtocolError {
    /// Whether retrying the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ProtocolError::Unreachable(_) | ProtocolError::Throttled { .. } => true,
            ProtocolError::Server { status, .. } => *status >= 500,
            ProtocolError::Unauthorized(_)
            | ProtocolError::Rejected { .. }
            | ProtocolError::Malformed(_) => false,
        }
    }

    /// Minimum wait requested by the server, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProtocolError::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Port for the remote sync endpoints of every collection
#[async_trait::async_trait]
pub trait ISyncProtocol: Send + Sync {
    /// Fetch all entries of `collection` changed since `since`
    ///
    /// `None` requests the full collection.
    async fn pull(
        &self,
        collection: Collection,
        since: Option<SyncToken>,
    ) -> Result<PullResponse, ProtocolError>;

    /// Submit pending local records of `collection`
    ///
    /// The response carries one result per submitted entry, matched by id.
    async fn push(
        &self,
        collection: Collection,
        payload: PushPayload,
    ) -> Result<PushResponse, ProtocolError>;
}
