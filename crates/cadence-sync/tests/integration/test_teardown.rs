//! Sign-out teardown

use std::sync::Arc;

use cadence_cache::database_file_name;
use cadence_core::domain::{Collection, Note};
use cadence_core::ports::ILocalStore;
use cadence_sync::{
    ExecutionOutcome, InitialStrategy, ManagedStore, SessionTeardown, SyncGroup,
    SyncOrchestrator, SyncStore, SyncStoreConfig,
};

use crate::common::*;

#[tokio::test]
async fn test_teardown_stops_wipes_and_purges() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["cadence-v0.db", "cadence-v0.db-wal", "notes.txt"] {
        std::fs::write(dir.path().join(name), b"old").unwrap();
    }
    std::fs::write(dir.path().join(database_file_name()), b"current").unwrap();

    let local = memory_store().await;
    seed_synced(local.as_ref(), Collection::Notes, 1, "private").await;

    let protocol = ScriptedProtocol::new();
    let context = context();
    let store: Arc<dyn ManagedStore> = Arc::new(SyncStore::<Note>::new(
        SyncStoreConfig::new(protocol.clone(), local.clone()),
        context.clone(),
    ));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        context,
        vec![SyncGroup::new(vec![store]).with_strategy(InitialStrategy)],
    ));
    orchestrator.start();
    assert!(eventually(|| !protocol.pull_calls().is_empty()).await);

    let report = SessionTeardown::new(local.clone())
        .with_orchestrator(orchestrator.clone())
        .with_legacy_purge(dir.path().to_path_buf())
        .run()
        .await
        .unwrap();

    assert!(!orchestrator.is_running());
    assert!(row(local.as_ref(), Collection::Notes, 1).await.is_none());
    assert!(local.load_token(Collection::Notes).await.unwrap().is_none());

    let mut removed: Vec<_> = report
        .legacy_files_removed
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_owned))
        .collect();
    removed.sort();
    assert_eq!(removed, vec!["cadence-v0.db", "cadence-v0.db-wal"]);
    assert!(dir.path().join(database_file_name()).exists());
    assert!(dir.path().join("notes.txt").exists());

    let after = orchestrator
        .request_collection_sync(Collection::Notes, "manual")
        .await
        .unwrap();
    assert!(matches!(after, ExecutionOutcome::Cancelled));
}

#[tokio::test]
async fn test_teardown_without_orchestrator_only_wipes() {
    let local = memory_store().await;
    seed_synced(local.as_ref(), Collection::Notes, 2, "private").await;

    let report = SessionTeardown::new(local.clone()).run().await.unwrap();

    assert!(report.legacy_files_removed.is_empty());
    assert!(local.list(Collection::Notes).await.unwrap().is_empty());
}
