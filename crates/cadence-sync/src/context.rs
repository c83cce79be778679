//! Shared environment of one signed-in session
//!
//! A [`SyncContext`] bundles the providers and the telemetry hook every
//! store, executor and strategy reads from. It is built once per session
//! and shared behind an `Arc`.

use std::sync::Arc;

use cadence_core::ports::{
    ConnectivityProvider, DurabilityProvider, MessageBus, NoopTelemetry, SessionProvider,
    SyncTelemetry, VisibilityProvider,
};

use crate::environment::{
    ConnectivitySource, DurabilitySource, LocalMessageBus, SessionState, VisibilitySource,
};

/// Providers and telemetry shared by the engine
#[derive(Clone)]
pub struct SyncContext {
    connectivity: Arc<dyn ConnectivityProvider>,
    visibility: Arc<dyn VisibilityProvider>,
    session: Arc<dyn SessionProvider>,
    durability: Arc<dyn DurabilityProvider>,
    bus: Arc<dyn MessageBus>,
    telemetry: Arc<dyn SyncTelemetry>,
}

impl SyncContext {
    pub fn builder() -> SyncContextBuilder {
        SyncContextBuilder::default()
    }

    pub fn connectivity(&self) -> &Arc<dyn ConnectivityProvider> {
        &self.connectivity
    }

    pub fn visibility(&self) -> &Arc<dyn VisibilityProvider> {
        &self.visibility
    }

    pub fn session(&self) -> &Arc<dyn SessionProvider> {
        &self.session
    }

    pub fn durability(&self) -> &Arc<dyn DurabilityProvider> {
        &self.durability
    }

    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.bus
    }

    pub fn telemetry(&self) -> &Arc<dyn SyncTelemetry> {
        &self.telemetry
    }
}

/// Builder for [`SyncContext`]
///
/// Unset providers default to an online, visible, durable environment with
/// no session, an in-process bus and no telemetry.
#[derive(Default)]
pub struct SyncContextBuilder {
    connectivity: Option<Arc<dyn ConnectivityProvider>>,
    visibility: Option<Arc<dyn VisibilityProvider>>,
    session: Option<Arc<dyn SessionProvider>>,
    durability: Option<Arc<dyn DurabilityProvider>>,
    bus: Option<Arc<dyn MessageBus>>,
    telemetry: Option<Arc<dyn SyncTelemetry>>,
}

impl SyncContextBuilder {
    pub fn connectivity(mut self, provider: Arc<dyn ConnectivityProvider>) -> Self {
        self.connectivity = Some(provider);
        self
    }

    pub fn visibility(mut self, provider: Arc<dyn VisibilityProvider>) -> Self {
        self.visibility = Some(provider);
        self
    }

    pub fn session(mut self, provider: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(provider);
        self
    }

    pub fn durability(mut self, provider: Arc<dyn DurabilityProvider>) -> Self {
        self.durability = Some(provider);
        self
    }

    pub fn bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn SyncTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn build(self) -> SyncContext {
        SyncContext {
            connectivity: self
                .connectivity
                .unwrap_or_else(|| Arc::new(ConnectivitySource::online())),
            visibility: self
                .visibility
                .unwrap_or_else(|| Arc::new(VisibilitySource::default())),
            session: self
                .session
                .unwrap_or_else(|| Arc::new(SessionState::default())),
            durability: self
                .durability
                .unwrap_or_else(|| Arc::new(DurabilitySource::default())),
            bus: self.bus.unwrap_or_else(|| Arc::new(LocalMessageBus::new())),
            telemetry: self.telemetry.unwrap_or_else(|| Arc::new(NoopTelemetry)),
        }
    }
}
