//! Session teardown
//!
//! On sign-out every trace of the user leaves the device: sync stops, the
//! local snapshot and all cursors are wiped, and databases left behind by
//! older schema versions are deleted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use cadence_cache::purge_legacy_databases;
use cadence_core::ports::ILocalStore;

use crate::orchestrator::SyncOrchestrator;

/// What a teardown removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Database files of other schema versions that were deleted
    pub legacy_files_removed: Vec<PathBuf>,
}

/// Sign-out sequence
pub struct SessionTeardown {
    orchestrator: Option<Arc<SyncOrchestrator>>,
    local: Arc<dyn ILocalStore>,
    data_dir: Option<PathBuf>,
}

impl SessionTeardown {
    pub fn new(local: Arc<dyn ILocalStore>) -> Self {
        Self {
            orchestrator: None,
            local,
            data_dir: None,
        }
    }

    /// Stop this orchestrator before wiping
    pub fn with_orchestrator(mut self, orchestrator: Arc<SyncOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    /// Also delete stale database files in `data_dir`
    pub fn with_legacy_purge(mut self, data_dir: PathBuf) -> Self {
        self.data_dir = Some(data_dir);
        self
    }

    /// Stop sync, wipe local state, purge legacy databases
    ///
    /// Sync is stopped before anything is deleted, so no cycle can write
    /// into the store while it is being wiped.
    pub async fn run(&self) -> anyhow::Result<TeardownReport> {
        if let Some(orchestrator) = &self.orchestrator {
            orchestrator.stop().await;
        }

        self.local
            .wipe_all()
            .await
            .context("Failed to wipe local sync state")?;
        info!("Local sync state wiped");

        let mut report = TeardownReport::default();
        if let Some(dir) = &self.data_dir {
            report.legacy_files_removed = purge_legacy_databases(dir)
                .with_context(|| format!("Failed to purge legacy databases in {}", dir.display()))?;
        }
        Ok(report)
    }
}
