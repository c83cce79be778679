//! Cadence Remote - HTTP adapter for the sync protocol
//!
//! Provides:
//! - [`client::ApiClient`]: authenticated JSON client with status mapping
//! - [`pull`] / [`push`]: the per-collection sync endpoints
//! - [`protocol::HttpSyncProtocol`]: the `ISyncProtocol` adapter
//!
//! ## Modules
//!
//! - [`client`] - HTTP client, bearer auth and error classification
//! - [`pull`] - `GET /api/sync/v1/{collection}`
//! - [`push`] - `POST /api/sync/v1/{collection}`
//! - [`retry_after`] - `Retry-After` header parsing

pub mod client;
pub mod protocol;
pub mod pull;
pub mod push;
pub mod retry_after;

pub use client::ApiClient;
pub use protocol::HttpSyncProtocol;

use thiserror::Error;

/// Errors raised while setting up the remote adapter
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The configured base URL cannot be used
    #[error("Invalid base URL '{0}'")]
    InvalidBaseUrl(String),

    /// The HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}
