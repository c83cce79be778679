//! Retry layer
//!
//! Runs one request with up to `max_attempts` tries, sleeping out the
//! backoff between retryable failures. While offline it does not call the
//! request at all: it enters a paused state that the next reconnect clears,
//! together with the backoff.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cadence_core::domain::Collection;
use cadence_core::ports::{ConnectivityProvider, Subscription};

use crate::backoff::{BackoffPolicy, SyncBackoff};
use crate::SyncError;

/// State shared with the connectivity listener
struct RetryState {
    collection: Collection,
    backoff: Mutex<SyncBackoff>,
    paused: AtomicBool,
}

impl RetryState {
    fn backoff(&self) -> MutexGuard<'_, SyncBackoff> {
        self.backoff.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_connectivity(&self, offline: bool) {
        if offline {
            return;
        }
        let was_paused = self.paused.swap(false, Ordering::SeqCst);
        self.backoff().reset();
        if was_paused {
            info!(collection = %self.collection, "Connection restored, sync resumed");
        }
    }
}

/// Per-collection retry policy with a connectivity-aware pause
pub struct SyncRetry {
    state: Arc<RetryState>,
    connectivity: Arc<dyn ConnectivityProvider>,
    subscription: Mutex<Option<Subscription>>,
}

impl SyncRetry {
    pub fn new(
        collection: Collection,
        policy: BackoffPolicy,
        connectivity: Arc<dyn ConnectivityProvider>,
    ) -> Self {
        Self {
            state: Arc::new(RetryState {
                collection,
                backoff: Mutex::new(SyncBackoff::new(policy)),
                paused: AtomicBool::new(false),
            }),
            connectivity,
            subscription: Mutex::new(None),
        }
    }

    /// Whether the last request found the device offline and no reconnect
    /// has been seen since
    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    /// Whether a backoff deadline is still in the future
    pub fn is_backing_off(&self) -> bool {
        self.state.backoff().is_backing_off(Instant::now())
    }

    /// Remaining backoff, if any
    pub fn backoff_remaining(&self) -> Option<Duration> {
        let until = self.state.backoff().backoff_until()?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }

    pub fn failure_count(&self) -> u32 {
        self.state.backoff().failure_count()
    }

    /// Subscribes to connectivity changes on first use
    fn ensure_subscribed(&self) {
        let mut slot = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        let state = Arc::clone(&self.state);
        *slot = Some(
            self.connectivity
                .on_change(Arc::new(move |offline| state.on_connectivity(offline))),
        );
    }

    /// Run `f` until it succeeds, fails permanently or runs out of attempts
    ///
    /// # Errors
    /// - `Offline` without calling `f` when the device is offline
    /// - `Cancelled` when `cancel` fires while waiting
    /// - the last error of `f` otherwise
    pub async fn request<T, F, Fut>(&self, cancel: &CancellationToken, mut f: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        self.ensure_subscribed();
        let collection = self.state.collection;
        let max_attempts = self.state.backoff().policy().max_attempts;
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            if self.connectivity.is_offline() {
                if !self.state.paused.swap(true, Ordering::SeqCst) {
                    info!(%collection, "Offline, sync paused until reconnect");
                }
                return Err(SyncError::Offline);
            }

            let deadline = self.state.backoff().backoff_until();
            if let Some(deadline) = deadline.filter(|d| *d > Instant::now()) {
                debug!(%collection, "Waiting out backoff");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }

            attempt += 1;
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(%collection, attempt, "Sync succeeded after retry");
                    }
                    self.state.backoff().reset();
                    return Ok(value);
                }
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(err) if err.is_retryable() => {
                    let delay = self.state.backoff().record_failure(err.retry_after());
                    if attempt >= max_attempts {
                        warn!(
                            %collection,
                            attempt,
                            error = %err,
                            "Retries exhausted"
                        );
                        return Err(err);
                    }
                    warn!(
                        %collection,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient sync error, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}
