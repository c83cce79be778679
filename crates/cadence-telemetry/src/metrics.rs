//! Prometheus metrics registry for Cadence
//!
//! Counts sync cycles, records moved in each direction, failures and
//! dropped requests, all labelled by collection. The registry implements
//! [`SyncTelemetry`] so the engine feeds it directly.

use std::path::Path;
use std::time::Duration;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use cadence_core::domain::Collection;
use cadence_core::ports::{CycleSummary, FailureKind, SyncTelemetry};

/// Central metrics registry holding all Prometheus metrics.
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: sync cycles started by (collection, reason)
    pub sync_cycles_total: IntCounterVec,
    /// Counter: records by (collection, outcome: pushed, rejected, pulled, applied)
    pub sync_records_total: IntCounterVec,
    /// Counter: failures by (collection, kind)
    pub sync_failures_total: IntCounterVec,
    /// Counter: requests dropped before running, by (collection, reason)
    pub sync_requests_dropped_total: IntCounterVec,
    /// Histogram: completed cycle duration in seconds
    pub sync_cycle_duration_seconds: HistogramVec,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("cadence".to_string()), None)?;

        let sync_cycles_total = IntCounterVec::new(
            Opts::new("sync_cycles_total", "Sync cycles started"),
            &["collection", "reason"],
        )?;
        registry.register(Box::new(sync_cycles_total.clone()))?;

        let sync_records_total = IntCounterVec::new(
            Opts::new("sync_records_total", "Records moved by sync cycles"),
            &["collection", "outcome"],
        )?;
        registry.register(Box::new(sync_records_total.clone()))?;

        let sync_failures_total = IntCounterVec::new(
            Opts::new("sync_failures_total", "Sync failures by kind"),
            &["collection", "kind"],
        )?;
        registry.register(Box::new(sync_failures_total.clone()))?;

        let sync_requests_dropped_total = IntCounterVec::new(
            Opts::new(
                "sync_requests_dropped_total",
                "Sync requests dropped while in flight or backing off",
            ),
            &["collection", "reason"],
        )?;
        registry.register(Box::new(sync_requests_dropped_total.clone()))?;

        let sync_cycle_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "sync_cycle_duration_seconds",
                "Duration of completed sync cycles in seconds",
            )
            .buckets(vec![0.05, 0.25, 1.0, 5.0, 30.0, f64::INFINITY]),
            &["collection"],
        )?;
        registry.register(Box::new(sync_cycle_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            sync_cycles_total,
            sync_records_total,
            sync_failures_total,
            sync_requests_dropped_total,
            sync_cycle_duration_seconds,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    /// Record the start of a sync cycle.
    pub fn record_cycle(&self, collection: Collection, reason: &str) {
        self.sync_cycles_total
            .with_label_values(&[collection.as_str(), reason])
            .inc();
    }

    /// Record records moved by a completed cycle.
    pub fn record_summary(&self, collection: Collection, summary: &CycleSummary) {
        let outcomes = [
            ("pushed", summary.pushed),
            ("rejected", summary.rejected),
            ("pulled", summary.pulled),
            ("applied", summary.applied),
        ];
        for (outcome, count) in outcomes {
            if count > 0 {
                self.sync_records_total
                    .with_label_values(&[collection.as_str(), outcome])
                    .inc_by(count);
            }
        }
    }

    /// Record a failure.
    pub fn record_failure_kind(&self, collection: Collection, kind: FailureKind) {
        self.sync_failures_total
            .with_label_values(&[collection.as_str(), kind.as_str()])
            .inc();
    }

    /// Record a dropped request.
    pub fn record_dropped(&self, collection: Collection, reason: &str) {
        self.sync_requests_dropped_total
            .with_label_values(&[collection.as_str(), reason])
            .inc();
    }

    /// Observe a completed cycle duration.
    pub fn observe_cycle_duration(&self, collection: Collection, duration: Duration) {
        self.sync_cycle_duration_seconds
            .with_label_values(&[collection.as_str()])
            .observe(duration.as_secs_f64());
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Write the text exposition to `path`, creating parent directories.
    pub fn write_to_file(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.encode()?)?;
        tracing::debug!(path = %path.display(), "Wrote metrics file");
        Ok(())
    }
}

impl SyncTelemetry for MetricsRegistry {
    fn cycle_started(&self, collection: Collection, reason: &str) {
        self.record_cycle(collection, reason);
    }

    fn cycle_finished(&self, collection: Collection, summary: &CycleSummary, elapsed: Duration) {
        self.record_summary(collection, summary);
        self.observe_cycle_duration(collection, elapsed);
    }

    fn record_failure(&self, collection: Collection, kind: FailureKind, _message: &str) {
        self.record_failure_kind(collection, kind);
    }

    fn request_dropped(&self, collection: Collection, reason: &str) {
        self.record_dropped(collection, reason);
    }
}
