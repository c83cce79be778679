//! Cadence Telemetry - Sync metrics
//!
//! Provides:
//! - `MetricsRegistry`: Prometheus counters and histograms labelled by
//!   collection, fed through the `SyncTelemetry` hook

pub mod metrics;

pub use metrics::MetricsRegistry;
