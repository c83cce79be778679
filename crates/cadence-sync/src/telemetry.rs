//! Telemetry sinks provided by the engine
//!
//! [`TracingTelemetry`] turns the hook into structured log events;
//! [`CompositeTelemetry`] forwards to several sinks, e.g. logs plus the
//! Prometheus registry from `cadence-telemetry`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use cadence_core::domain::Collection;
use cadence_core::ports::{CycleSummary, FailureKind, SyncTelemetry};

/// Logs every hook call through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl SyncTelemetry for TracingTelemetry {
    fn cycle_started(&self, collection: Collection, reason: &str) {
        debug!(%collection, reason, "Sync cycle started");
    }

    fn cycle_finished(&self, collection: Collection, summary: &CycleSummary, elapsed: Duration) {
        info!(
            %collection,
            pushed = summary.pushed,
            rejected = summary.rejected,
            pulled = summary.pulled,
            applied = summary.applied,
            duration_ms = elapsed.as_millis() as u64,
            "Sync cycle finished"
        );
    }

    fn record_failure(&self, collection: Collection, kind: FailureKind, message: &str) {
        warn!(%collection, %kind, message, "Sync failure");
    }

    fn request_dropped(&self, collection: Collection, reason: &str) {
        debug!(%collection, reason, "Sync request dropped");
    }
}

/// Forwards every hook call to each inner sink in order
#[derive(Clone, Default)]
pub struct CompositeTelemetry {
    sinks: Vec<Arc<dyn SyncTelemetry>>,
}

impl CompositeTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn SyncTelemetry>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl SyncTelemetry for CompositeTelemetry {
    fn cycle_started(&self, collection: Collection, reason: &str) {
        for sink in &self.sinks {
            sink.cycle_started(collection, reason);
        }
    }

    fn cycle_finished(&self, collection: Collection, summary: &CycleSummary, elapsed: Duration) {
        for sink in &self.sinks {
            sink.cycle_finished(collection, summary, elapsed);
        }
    }

    fn record_failure(&self, collection: Collection, kind: FailureKind, message: &str) {
        for sink in &self.sinks {
            sink.record_failure(collection, kind, message);
        }
    }

    fn request_dropped(&self, collection: Collection, reason: &str) {
        for sink in &self.sinks {
            sink.request_dropped(collection, reason);
        }
    }
}
