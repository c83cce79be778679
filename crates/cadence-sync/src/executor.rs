//! Single-flight executor
//!
//! At most one request per collection runs at a time. A request that
//! arrives while another is in flight, or while a backoff deadline is
//! pending, is dropped and reported as such rather than queued.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use cadence_core::domain::Collection;
use cadence_core::ports::{FailureKind, SyncTelemetry};

use crate::retry::SyncRetry;
use crate::SyncError;

/// Why a request did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    InFlight,
    BackingOff,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::InFlight => "in_flight",
            DropReason::BackingOff => "backing_off",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one executor request
#[derive(Debug)]
pub enum ExecutionOutcome<T> {
    Completed(T),
    Dropped(DropReason),
    /// The device was offline; nothing was sent
    Unreachable,
    Cancelled,
    Failed(SyncError),
}

impl<T> ExecutionOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            ExecutionOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// Short label for logs and CLI output
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Completed(_) => "completed",
            ExecutionOutcome::Dropped(DropReason::InFlight) => "dropped_in_flight",
            ExecutionOutcome::Dropped(DropReason::BackingOff) => "dropped_backing_off",
            ExecutionOutcome::Unreachable => "unreachable",
            ExecutionOutcome::Cancelled => "cancelled",
            ExecutionOutcome::Failed(_) => "failed",
        }
    }
}

/// Observable executor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    BackingOff,
    InFlight,
    Paused,
}

impl ExecutorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorState::Idle => "idle",
            ExecutorState::BackingOff => "backing_off",
            ExecutorState::InFlight => "in_flight",
            ExecutorState::Paused => "paused",
        }
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clears the in-flight flag when the request ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Single-flight gate in front of a [`SyncRetry`]
pub struct SyncExecutor {
    collection: Collection,
    in_flight: AtomicBool,
    retry: SyncRetry,
    telemetry: Arc<dyn SyncTelemetry>,
}

impl SyncExecutor {
    pub fn new(collection: Collection, retry: SyncRetry, telemetry: Arc<dyn SyncTelemetry>) -> Self {
        Self {
            collection,
            in_flight: AtomicBool::new(false),
            retry,
            telemetry,
        }
    }

    pub fn state(&self) -> ExecutorState {
        if self.in_flight.load(Ordering::SeqCst) {
            ExecutorState::InFlight
        } else if self.retry.is_paused() {
            ExecutorState::Paused
        } else if self.retry.is_backing_off() {
            ExecutorState::BackingOff
        } else {
            ExecutorState::Idle
        }
    }

    pub fn retry(&self) -> &SyncRetry {
        &self.retry
    }

    /// Run `f` through the retry layer unless another request is running
    /// or a backoff is pending
    pub async fn request<T, F, Fut>(
        &self,
        reason: &str,
        cancel: &CancellationToken,
        f: F,
    ) -> ExecutionOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let collection = self.collection;
        if cancel.is_cancelled() {
            return ExecutionOutcome::Cancelled;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return self.dropped(reason, DropReason::InFlight);
        }
        let _guard = InFlightGuard(&self.in_flight);

        if self.retry.is_backing_off() {
            return self.dropped(reason, DropReason::BackingOff);
        }

        match self.retry.request(cancel, f).await {
            Ok(value) => ExecutionOutcome::Completed(value),
            Err(SyncError::Cancelled) => {
                debug!(%collection, reason, "Sync request cancelled");
                ExecutionOutcome::Cancelled
            }
            Err(SyncError::Offline) => {
                self.telemetry
                    .record_failure(collection, FailureKind::Unreachable, "offline");
                ExecutionOutcome::Unreachable
            }
            Err(err) => {
                let kind = if err.is_retryable() {
                    FailureKind::Exhausted
                } else {
                    err.failure_kind().unwrap_or(FailureKind::Rejected)
                };
                self.telemetry
                    .record_failure(collection, kind, &err.to_string());
                ExecutionOutcome::Failed(err)
            }
        }
    }

    fn dropped<T>(&self, reason: &str, why: DropReason) -> ExecutionOutcome<T> {
        debug!(collection = %self.collection, reason, dropped = %why, "Sync request dropped");
        self.telemetry.request_dropped(self.collection, why.as_str());
        ExecutionOutcome::Dropped(why)
    }
}
