//! Sync telemetry port
//!
//! A hook the engine calls at cycle boundaries and on every failure, always
//! tagged with the originating collection. Implementations may log, count
//! or forward; they must be cheap and must never fail the caller.

use std::fmt;
use std::time::Duration;

use crate::domain::Collection;

/// Category of a sync failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Transport failure or offline
    Unreachable,
    /// Server refused a request or a record
    Rejected,
    /// Response or stored data could not be decoded
    Decode,
    /// Local transaction failed
    LocalApply,
    /// Retries exhausted on a retryable failure
    Exhausted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Unreachable => "unreachable",
            FailureKind::Rejected => "rejected",
            FailureKind::Decode => "decode",
            FailureKind::LocalApply => "local_apply",
            FailureKind::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts reported when a cycle completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub pushed: u64,
    pub rejected: u64,
    pub pulled: u64,
    pub applied: u64,
}

/// Observer of sync activity
///
/// Every method has an empty default so implementors pick what they need.
pub trait SyncTelemetry: Send + Sync {
    fn cycle_started(&self, _collection: Collection, _reason: &str) {}

    fn cycle_finished(&self, _collection: Collection, _summary: &CycleSummary, _elapsed: Duration) {}

    fn record_failure(&self, _collection: Collection, _kind: FailureKind, _message: &str) {}

    /// A request was dropped by the single-flight or backoff gate
    fn request_dropped(&self, _collection: Collection, _reason: &str) {}
}

/// Telemetry sink that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl SyncTelemetry for NoopTelemetry {}
