//! Cadence Sync - Offline-first synchronization engine
//!
//! Provides:
//! - Per-collection sync stores that push pending mutations, pull changes
//!   since a cursor and apply resolutions transactionally
//! - Single-flight execution with exponential backoff and a
//!   connectivity-aware pause
//! - An orchestrator that fans triggers (startup, polling, visibility,
//!   connectivity, broadcast) out to stores
//! - A read facade over the local snapshot and a session teardown
//!
//! ## Modules
//!
//! - [`context`] - Shared environment providers and telemetry for one session
//! - [`environment`] - `tokio::sync::watch` and broadcast based providers
//! - [`store`] - `SyncStore`, the per-collection sync cycle
//! - [`backoff`] / [`retry`] / [`executor`] - Failure handling pipeline
//! - [`strategy`] / [`orchestrator`] - Triggers and fan-out
//! - [`registry`] / [`repository`] - Typed access to stores and local data
//! - [`teardown`] - Sign-out cleanup

pub mod backoff;
pub mod context;
pub mod environment;
pub mod executor;
pub mod orchestrator;
pub mod registry;
pub mod repository;
pub mod retry;
pub mod store;
pub mod strategy;
pub mod teardown;
pub mod telemetry;

pub use backoff::{BackoffPolicy, SyncBackoff};
pub use context::{SyncContext, SyncContextBuilder};
pub use executor::{DropReason, ExecutionOutcome, ExecutorState, SyncExecutor};
pub use orchestrator::{CollectionOutcome, SyncGroup, SyncOrchestrator};
pub use registry::StoreRegistry;
pub use repository::Repository;
pub use retry::SyncRetry;
pub use store::{ManagedStore, RejectedRecord, SyncReport, SyncStore, SyncStoreConfig};
pub use strategy::{
    BroadcastStrategy, ConnectivityStrategy, InitialStrategy, PollingStrategy, StrategyHandle,
    SyncStrategy, Trigger, VisibilityStrategy,
};
pub use teardown::{SessionTeardown, TeardownReport};
pub use telemetry::{CompositeTelemetry, TracingTelemetry};

use std::time::Duration;

use thiserror::Error;

use cadence_core::domain::Collection;
use cadence_core::ports::{FailureKind, ProtocolError};

/// Errors that can end a sync cycle
#[derive(Debug, Error)]
pub enum SyncError {
    /// The protocol adapter failed
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A server entry or a stored row does not match the collection's model
    #[error("Failed to decode {collection} record: {source}")]
    Decode {
        collection: Collection,
        #[source]
        source: serde_json::Error,
    },

    /// The local transaction failed; the cursor was not advanced
    #[error("Local apply failed: {0:#}")]
    LocalApply(anyhow::Error),

    /// Reading local state failed
    #[error("Local read failed: {0:#}")]
    LocalRead(anyhow::Error),

    /// The device is offline; nothing was sent
    #[error("Offline")]
    Offline,

    /// The cycle was cancelled
    #[error("Cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether the retry layer should try again after a backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Protocol(e) => e.is_retryable(),
            SyncError::LocalApply(_) | SyncError::LocalRead(_) => true,
            SyncError::Decode { .. } | SyncError::Offline | SyncError::Cancelled => false,
        }
    }

    /// Minimum wait requested by the server, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::Protocol(e) => e.retry_after(),
            _ => None,
        }
    }

    /// Telemetry category, `None` for cancellation
    pub fn failure_kind(&self) -> Option<FailureKind> {
        let kind = match self {
            SyncError::Protocol(ProtocolError::Unreachable(_))
            | SyncError::Protocol(ProtocolError::Throttled { .. })
            | SyncError::Protocol(ProtocolError::Server { .. })
            | SyncError::Offline => FailureKind::Unreachable,
            SyncError::Protocol(ProtocolError::Unauthorized(_))
            | SyncError::Protocol(ProtocolError::Rejected { .. }) => FailureKind::Rejected,
            SyncError::Protocol(ProtocolError::Malformed(_)) | SyncError::Decode { .. } => {
                FailureKind::Decode
            }
            SyncError::LocalApply(_) | SyncError::LocalRead(_) => FailureKind::LocalApply,
            SyncError::Cancelled => return None,
        };
        Some(kind)
    }
}
