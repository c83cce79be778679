//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync engine
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ISyncProtocol`] - Pull/push against the remote authoritative store
//! - [`ILocalStore`] - Local persisted snapshot and cursors
//! - Environment providers - connectivity, visibility, session, durability,
//!   inter-instance messaging
//! - [`SyncTelemetry`] - Structured hook for cycle outcomes and failures

pub mod environment;
pub mod local_store;
pub mod protocol;
pub mod telemetry;

pub use environment::{
    ConnectivityProvider, DurabilityProvider, Listener, MessageBus, Session, SessionProvider,
    Subscription, SyncSignal, VisibilityProvider,
};
pub use local_store::{ApplyStats, ChangeBatch, DestroyMode, ILocalStore, NewRecord, Overwrite};
pub use protocol::{ISyncProtocol, ProtocolError};
pub use telemetry::{CycleSummary, FailureKind, NoopTelemetry, SyncTelemetry};
