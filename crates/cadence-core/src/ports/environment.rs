//! Environment provider ports (driven/secondary ports)
//!
//! The host application owns these observable sources; the engine only
//! reads them and subscribes to changes. Every subscription returns a
//! [`Subscription`] handle that unsubscribes when dropped or when
//! [`Subscription::unsubscribe`] is called.
//!
//! ## Design Notes
//!
//! - Listeners are plain callbacks. They must not block; long work should
//!   be handed off to a task.
//! - Providers are `Send + Sync` and shared behind `Arc`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::Collection;

/// Callback invoked with the new value on every change
pub type Listener<T> = Arc<dyn Fn(T) + Send + Sync>;

// ============================================================================
// Subscription
// ============================================================================

/// Handle to an active change subscription
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wraps the given unsubscribe action
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to tear down
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Stops delivering changes to the listener
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ============================================================================
// Provider traits
// ============================================================================

/// Network reachability as seen by the host
pub trait ConnectivityProvider: Send + Sync {
    fn is_offline(&self) -> bool;

    /// Listener receives the new `offline` flag
    fn on_change(&self, listener: Listener<bool>) -> Subscription;
}

/// Whether the user is currently looking at the application
pub trait VisibilityProvider: Send + Sync {
    fn is_visible(&self) -> bool;

    fn on_change(&self, listener: Listener<bool>) -> Subscription;
}

/// Credentials of the signed-in user
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: u64,
    pub access_token: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// The authenticated session, if any
pub trait SessionProvider: Send + Sync {
    fn current(&self) -> Option<Session>;

    fn on_change(&self, listener: Listener<Option<Session>>) -> Subscription;
}

/// Whether local storage is guaranteed to survive eviction
pub trait DurabilityProvider: Send + Sync {
    fn is_durable(&self) -> bool;

    fn on_change(&self, listener: Listener<bool>) -> Subscription;
}

/// Messages exchanged between engine instances sharing one local database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncSignal {
    /// Another instance asks everyone to sync (all collections when `None`)
    SyncRequested { collection: Option<Collection> },
    /// A collection's local snapshot changed after a sync
    CollectionChanged { collection: Collection },
}

/// Inter-instance messaging (e.g. between tabs or processes)
pub trait MessageBus: Send + Sync {
    fn publish(&self, signal: SyncSignal);

    fn on_message(&self, listener: Listener<SyncSignal>) -> Subscription;
}
