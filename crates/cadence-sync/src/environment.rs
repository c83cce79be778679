//! In-process environment providers
//!
//! Every observable value is a [`WatchSource`] over `tokio::sync::watch`.
//! Subscribing spawns a listener task that ends when its [`Subscription`]
//! is dropped. The message bus is a `tokio::sync::broadcast` channel.
//!
//! Listeners run on the spawned task, so delivery is asynchronous with
//! respect to the setter.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use cadence_core::ports::{
    ConnectivityProvider, DurabilityProvider, Listener, MessageBus, Session, SessionProvider,
    Subscription, SyncSignal, VisibilityProvider,
};

/// Capacity of the broadcast channel behind [`LocalMessageBus`]
const BUS_CAPACITY: usize = 64;

// ============================================================================
// WatchSource
// ============================================================================

/// An observable value
pub struct WatchSource<T> {
    tx: watch::Sender<T>,
}

impl<T> WatchSource<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Replace the value; listeners are notified only when it changed
    ///
    /// Returns whether the value changed.
    pub fn set(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    /// Call `listener` with every subsequent change
    ///
    /// Must be called from within a tokio runtime; outside one the
    /// subscription is inert.
    pub fn subscribe(&self, listener: Listener<T>) -> Subscription {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("Subscribed outside a tokio runtime, changes will not be delivered");
            return Subscription::noop();
        };

        let mut rx = self.tx.subscribe();
        let token = CancellationToken::new();
        let stopped = token.clone();

        handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let value = rx.borrow_and_update().clone();
                        listener(value);
                    }
                }
            }
        });

        Subscription::new(move || token.cancel())
    }
}

impl<T> Default for WatchSource<T>
where
    T: Clone + PartialEq + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

// ============================================================================
// Providers
// ============================================================================

/// Connectivity flag set by the host (or by a probe loop)
pub struct ConnectivitySource {
    offline: WatchSource<bool>,
}

impl ConnectivitySource {
    pub fn new(offline: bool) -> Self {
        Self {
            offline: WatchSource::new(offline),
        }
    }

    /// Always online until told otherwise
    pub fn online() -> Self {
        Self::new(false)
    }

    pub fn set_offline(&self, offline: bool) -> bool {
        let changed = self.offline.set(offline);
        if changed {
            trace!(offline, "Connectivity changed");
        }
        changed
    }
}

impl ConnectivityProvider for ConnectivitySource {
    fn is_offline(&self) -> bool {
        self.offline.get()
    }

    fn on_change(&self, listener: Listener<bool>) -> Subscription {
        self.offline.subscribe(listener)
    }
}

/// Visibility flag of the host application
pub struct VisibilitySource {
    visible: WatchSource<bool>,
}

impl VisibilitySource {
    pub fn new(visible: bool) -> Self {
        Self {
            visible: WatchSource::new(visible),
        }
    }

    pub fn set_visible(&self, visible: bool) -> bool {
        self.visible.set(visible)
    }
}

impl Default for VisibilitySource {
    fn default() -> Self {
        Self::new(true)
    }
}

impl VisibilityProvider for VisibilitySource {
    fn is_visible(&self) -> bool {
        self.visible.get()
    }

    fn on_change(&self, listener: Listener<bool>) -> Subscription {
        self.visible.subscribe(listener)
    }
}

/// The signed-in session
#[derive(Default)]
pub struct SessionState {
    session: WatchSource<Option<Session>>,
}

impl SessionState {
    pub fn new(session: Option<Session>) -> Self {
        Self {
            session: WatchSource::new(session),
        }
    }

    pub fn sign_in(&self, session: Session) {
        self.session.set(Some(session));
    }

    pub fn sign_out(&self) {
        self.session.set(None);
    }
}

impl SessionProvider for SessionState {
    fn current(&self) -> Option<Session> {
        self.session.get()
    }

    fn on_change(&self, listener: Listener<Option<Session>>) -> Subscription {
        self.session.subscribe(listener)
    }
}

/// Storage durability flag
pub struct DurabilitySource {
    durable: WatchSource<bool>,
}

impl DurabilitySource {
    pub fn new(durable: bool) -> Self {
        Self {
            durable: WatchSource::new(durable),
        }
    }

    pub fn set_durable(&self, durable: bool) -> bool {
        self.durable.set(durable)
    }
}

impl Default for DurabilitySource {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DurabilityProvider for DurabilitySource {
    fn is_durable(&self) -> bool {
        self.durable.get()
    }

    fn on_change(&self, listener: Listener<bool>) -> Subscription {
        self.durable.subscribe(listener)
    }
}

// ============================================================================
// Message bus
// ============================================================================

/// In-process broadcast bus
///
/// Every subscriber, including ones owned by the publisher, receives every
/// signal. Slow subscribers skip signals they lagged behind on.
#[derive(Clone)]
pub struct LocalMessageBus {
    tx: broadcast::Sender<SyncSignal>,
}

impl LocalMessageBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }
}

impl Default for LocalMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus for LocalMessageBus {
    fn publish(&self, signal: SyncSignal) {
        if self.tx.send(signal).is_err() {
            trace!("Published sync signal with no subscribers");
        }
    }

    fn on_message(&self, listener: Listener<SyncSignal>) -> Subscription {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("Subscribed outside a tokio runtime, messages will not be delivered");
            return Subscription::noop();
        };

        let mut rx = self.tx.subscribe();
        let token = CancellationToken::new();
        let stopped = token.clone();

        handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = stopped.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(signal) => listener(signal),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Message bus subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        Subscription::new(move || token.cancel())
    }
}

/// Convenience for tests and hosts that only need a listener closure
pub fn listener<T, F>(f: F) -> Listener<T>
where
    F: Fn(T) + Send + Sync + 'static,
{
    Arc::new(f)
}
