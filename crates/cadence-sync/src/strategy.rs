//! Sync strategies - sources of sync triggers
//!
//! A strategy watches one aspect of the environment and sends a
//! [`Trigger`] into its group's channel when a sync is warranted:
//!
//! | Strategy                 | Reason          | Fires when                          |
//! |--------------------------|-----------------|-------------------------------------|
//! | [`InitialStrategy`]      | `initial`       | once, at start                      |
//! | [`PollingStrategy`]      | `polling`       | every interval (optionally visible) |
//! | [`VisibilityStrategy`]   | `visible`       | hidden -> visible                   |
//! | [`ConnectivityStrategy`] | `reconnected`   | offline -> online                   |
//! | [`BroadcastStrategy`]    | `broadcast`     | another instance asks for a sync    |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use cadence_core::domain::Collection;
use cadence_core::ports::{Subscription, SyncSignal};

use crate::context::SyncContext;

/// A request to sync, tagged with why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub reason: &'static str,
    /// Restrict the sync to one collection; `None` means the whole group
    pub collection: Option<Collection>,
}

impl Trigger {
    pub fn new(reason: &'static str) -> Self {
        Self {
            reason,
            collection: None,
        }
    }

    pub fn for_collection(reason: &'static str, collection: Option<Collection>) -> Self {
        Self { reason, collection }
    }
}

/// What a started strategy leaves running
#[derive(Debug)]
pub enum StrategyHandle {
    /// Fired and finished
    Done,
    /// A background task that ends with the cancellation token
    Task(JoinHandle<()>),
    /// A provider subscription, released on drop
    Subscription(Subscription),
}

/// Source of sync triggers
pub trait SyncStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Begin emitting triggers into `tx` until `cancel` fires
    fn start(
        &self,
        context: &SyncContext,
        tx: mpsc::UnboundedSender<Trigger>,
        cancel: CancellationToken,
    ) -> StrategyHandle;
}

fn send(tx: &mpsc::UnboundedSender<Trigger>, trigger: Trigger) {
    if tx.send(trigger).is_err() {
        trace!("Trigger dropped, dispatcher has stopped");
    }
}

// ============================================================================
// Initial
// ============================================================================

/// Syncs once when the orchestrator starts
#[derive(Debug, Clone, Copy, Default)]
pub struct InitialStrategy;

impl SyncStrategy for InitialStrategy {
    fn name(&self) -> &'static str {
        "initial"
    }

    fn start(
        &self,
        _context: &SyncContext,
        tx: mpsc::UnboundedSender<Trigger>,
        _cancel: CancellationToken,
    ) -> StrategyHandle {
        send(&tx, Trigger::new("initial"));
        StrategyHandle::Done
    }
}

// ============================================================================
// Polling
// ============================================================================

/// Syncs on a fixed interval
#[derive(Debug, Clone, Copy)]
pub struct PollingStrategy {
    interval: Duration,
    only_when_visible: bool,
}

impl PollingStrategy {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            only_when_visible: false,
        }
    }

    /// Skip ticks while the application is hidden
    pub fn only_when_visible(mut self, only_when_visible: bool) -> Self {
        self.only_when_visible = only_when_visible;
        self
    }
}

impl SyncStrategy for PollingStrategy {
    fn name(&self) -> &'static str {
        "polling"
    }

    fn start(
        &self,
        context: &SyncContext,
        tx: mpsc::UnboundedSender<Trigger>,
        cancel: CancellationToken,
    ) -> StrategyHandle {
        let period = self.interval;
        let only_when_visible = self.only_when_visible;
        let visibility = Arc::clone(context.visibility());

        StrategyHandle::Task(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if only_when_visible && !visibility.is_visible() {
                            trace!("Polling tick skipped while hidden");
                            continue;
                        }
                        send(&tx, Trigger::new("polling"));
                    }
                }
            }
            debug!("Polling strategy stopped");
        }))
    }
}

// ============================================================================
// Visibility
// ============================================================================

/// Syncs when the application becomes visible again
#[derive(Debug, Clone, Copy, Default)]
pub struct VisibilityStrategy;

impl SyncStrategy for VisibilityStrategy {
    fn name(&self) -> &'static str {
        "visibility"
    }

    fn start(
        &self,
        context: &SyncContext,
        tx: mpsc::UnboundedSender<Trigger>,
        _cancel: CancellationToken,
    ) -> StrategyHandle {
        let was_visible = AtomicBool::new(context.visibility().is_visible());
        StrategyHandle::Subscription(context.visibility().on_change(Arc::new(move |visible| {
            let before = was_visible.swap(visible, Ordering::SeqCst);
            if visible && !before {
                send(&tx, Trigger::new("visible"));
            }
        })))
    }
}

// ============================================================================
// Connectivity
// ============================================================================

/// Syncs when the connection comes back
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectivityStrategy;

impl SyncStrategy for ConnectivityStrategy {
    fn name(&self) -> &'static str {
        "connectivity"
    }

    fn start(
        &self,
        context: &SyncContext,
        tx: mpsc::UnboundedSender<Trigger>,
        _cancel: CancellationToken,
    ) -> StrategyHandle {
        let was_offline = AtomicBool::new(context.connectivity().is_offline());
        StrategyHandle::Subscription(context.connectivity().on_change(Arc::new(
            move |offline| {
                let before = was_offline.swap(offline, Ordering::SeqCst);
                if before && !offline {
                    send(&tx, Trigger::new("reconnected"));
                }
            },
        )))
    }
}

// ============================================================================
// Broadcast
// ============================================================================

/// Syncs when another instance sharing the local database asks for it
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastStrategy;

impl SyncStrategy for BroadcastStrategy {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    fn start(
        &self,
        context: &SyncContext,
        tx: mpsc::UnboundedSender<Trigger>,
        _cancel: CancellationToken,
    ) -> StrategyHandle {
        StrategyHandle::Subscription(context.bus().on_message(Arc::new(move |signal| {
            if let SyncSignal::SyncRequested { collection } = signal {
                send(&tx, Trigger::for_collection("broadcast", collection));
            }
        })))
    }
}
