//! Cadence Daemon - Background synchronization service
//!
//! This binary runs as a user service and handles:
//! - Keeping every enabled collection in sync with the remote API
//! - Connectivity probing, so sync pauses offline and resumes on reconnect
//! - Metrics export on shutdown
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon opens the local snapshot, builds one sync store per enabled
//! collection and hands them to a [`SyncOrchestrator`] driven by the
//! initial, polling, connectivity and broadcast strategies. The main task
//! then runs the connectivity probe until a `CancellationToken` is
//! triggered by SIGTERM or SIGINT.

use std::sync::Arc;

use anyhow::{Context, Result};
use cadence_cache::{DatabasePool, SqliteLocalStore};
use cadence_core::config::Config;
use cadence_core::ports::{ILocalStore, Session};
use cadence_remote::{ApiClient, HttpSyncProtocol};
use cadence_sync::environment::{ConnectivitySource, SessionState};
use cadence_sync::{
    BroadcastStrategy, CompositeTelemetry, ConnectivityStrategy, InitialStrategy,
    PollingStrategy, StoreRegistry, SyncContext, SyncGroup, SyncOrchestrator, TracingTelemetry,
    VisibilityStrategy,
};
use cadence_telemetry::MetricsRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// DaemonService
// ============================================================================

/// Main daemon service that owns the local snapshot and the sync engine
struct DaemonService {
    /// Application configuration loaded from YAML
    config: Config,
    /// SQLite snapshot shared by every store
    local: Arc<SqliteLocalStore>,
    /// Prometheus counters fed by the telemetry hook
    metrics: Arc<MetricsRegistry>,
    /// Token for signalling graceful shutdown to all async tasks
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the database in the configured data directory
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let data_dir = &config.storage.data_dir;
        let pool = DatabasePool::open_in(data_dir)
            .await
            .with_context(|| format!("Failed to open database in {}", data_dir.display()))?;
        let local = Arc::new(SqliteLocalStore::new(pool.pool().clone()));
        let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics")?);

        info!(data_dir = %data_dir.display(), "Opened local snapshot");

        Ok(Self {
            config,
            local,
            metrics,
            shutdown,
        })
    }

    // ========================================================================
    // DaemonService::run()
    // ========================================================================

    /// Runs the daemon until shutdown
    ///
    /// 1. Waits for a session (config file or `CADENCE_ACCESS_TOKEN`)
    /// 2. Wires the HTTP protocol, stores and strategies
    /// 3. Starts the orchestrator and probes connectivity until shutdown
    /// 4. Stops the orchestrator and writes metrics
    async fn run(&self) -> Result<()> {
        let Some(session) = self.wait_for_session().await else {
            return Ok(());
        };
        info!(user_id = session.user_id, "Session found");

        let session = Arc::new(SessionState::new(Some(session)));
        let client = ApiClient::new(&self.config.remote, session.clone())
            .context("Failed to create API client")?;
        let connectivity = Arc::new(ConnectivitySource::online());

        let telemetry = CompositeTelemetry::new()
            .with(Arc::new(TracingTelemetry))
            .with(self.metrics.clone());
        let context = Arc::new(
            SyncContext::builder()
                .connectivity(connectivity.clone())
                .session(session)
                .telemetry(Arc::new(telemetry))
                .build(),
        );

        let protocol = Arc::new(HttpSyncProtocol::new(client.clone()));
        let registry = StoreRegistry::from_config(
            &self.config,
            context.clone(),
            protocol,
            self.local.clone(),
        );
        info!(
            collections = ?registry.collections(),
            base_url = client.base_url(),
            "Sync stores registered"
        );

        let orchestrator =
            SyncOrchestrator::new(context, vec![sync_group(&self.config, &registry)]);
        orchestrator.start();

        self.probe_loop(&client, &connectivity).await;

        orchestrator.stop().await;
        self.log_pending(&registry).await;
        self.write_metrics();
        Ok(())
    }

    /// Polls the configuration until it yields a session, or shutdown
    async fn wait_for_session(&self) -> Option<Session> {
        if let Some(session) = self.config.resolve_session() {
            return Some(session);
        }

        warn!("No session configured. Set session.access_token or CADENCE_ACCESS_TOKEN.");
        let config_path = Config::default_path();
        let mut interval = tokio::time::interval(self.config.sync.connectivity_probe_interval());
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Some(session) = Config::load_or_default(&config_path).resolve_session() {
                        return Some(session);
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received while waiting for a session");
                    return None;
                }
            }
        }
    }

    // ========================================================================
    // Connectivity probe
    // ========================================================================

    /// Probes the API host and feeds the result into the connectivity source
    ///
    /// The orchestrator's retry layer pauses while offline and the
    /// connectivity strategy triggers a sync when the probe succeeds again.
    async fn probe_loop(&self, client: &ApiClient, connectivity: &ConnectivitySource) {
        let period = self.config.sync.connectivity_probe_interval();
        info!(probe_interval_secs = period.as_secs(), "Starting connectivity probe");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let reachable = client.ping().await;
                    if connectivity.set_offline(!reachable) {
                        if reachable {
                            info!("API reachable again");
                        } else {
                            warn!("API unreachable, sync paused");
                        }
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping sync");
                    break;
                }
            }
        }
    }

    /// Logs how many local changes are still waiting for a push
    async fn log_pending(&self, registry: &StoreRegistry) {
        for collection in registry.collections() {
            match self.local.pending(collection).await {
                Ok(pending) if !pending.is_empty() => {
                    info!(
                        %collection,
                        pending = pending.len(),
                        "Unsynced local changes kept for next start"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(%collection, error = %e, "Failed to count pending changes"),
            }
        }
    }

    fn write_metrics(&self) {
        let Some(path) = &self.config.telemetry.metrics_file else {
            return;
        };
        match self.metrics.write_to_file(path) {
            Ok(()) => info!(path = %path.display(), "Metrics written"),
            Err(e) => error!(path = %path.display(), error = %e, "Failed to write metrics"),
        }
    }
}

/// Every store in one group driven by all trigger sources
fn sync_group(config: &Config, registry: &StoreRegistry) -> SyncGroup {
    let polling = PollingStrategy::new(config.sync.polling_interval())
        .only_when_visible(config.sync.poll_only_when_visible);
    debug!(
        polling_interval_secs = config.sync.polling_interval_secs,
        only_when_visible = config.sync.poll_only_when_visible,
        "Configuring sync strategies"
    );

    SyncGroup::new(registry.stores())
        .with_strategy(InitialStrategy)
        .with_strategy(polling)
        .with_strategy(VisibilityStrategy)
        .with_strategy(ConnectivityStrategy)
        .with_strategy(BroadcastStrategy)
}

// ============================================================================
// Logging
// ============================================================================

/// `RUST_LOG` when set, otherwise the configured level
fn env_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
}

fn init_tracing(config: &Config) {
    let filter = env_filter(config);
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = Config::default_path();
    let config = Config::load_or_default(&config_path);
    init_tracing(&config);

    info!(config_path = %config_path.display(), "Cadence daemon starting (cadenced)");

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!(field = %e.field, "{}", e.message);
        }
        anyhow::bail!("Invalid configuration ({} errors)", errors.len());
    }

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token.clone()).await?;

    let result = service.run().await;

    match &result {
        Ok(()) => info!("Cadence daemon shut down gracefully"),
        Err(e) => error!(error = %e, "Cadence daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
