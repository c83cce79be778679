//! SyncStore cycle tests

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use cadence_cache::SqliteLocalStore;
use cadence_core::domain::{
    Collection, EntryIds, Note, PullResponse, PushPayload, PushResponse, PushResult,
    RecordStatus, SyncToken, FAILURE_TYPE_INVALID,
};
use cadence_core::ports::{ILocalStore, ISyncProtocol, MessageBus, ProtocolError, SyncSignal};
use cadence_sync::environment::{listener, ConnectivitySource, LocalMessageBus};
use cadence_sync::{
    ExecutionOutcome, ManagedStore, SyncContext, SyncError, SyncStore, SyncStoreConfig,
};

use crate::common::*;

const NOTES: Collection = Collection::Notes;

fn note_store(
    protocol: Arc<ScriptedProtocol>,
    local: Arc<dyn ILocalStore>,
    context: Arc<SyncContext>,
) -> SyncStore<Note> {
    let config = SyncStoreConfig::<Note>::new(protocol, local).with_backoff(fast_backoff(3));
    SyncStore::new(config, context)
}

async fn setup() -> (Arc<ScriptedProtocol>, Arc<SqliteLocalStore>, SyncStore<Note>) {
    let protocol = ScriptedProtocol::new();
    let local = memory_store().await;
    let store = note_store(protocol.clone(), local.clone(), context());
    (protocol, local, store)
}

// ============================================================================
// Pull
// ============================================================================

#[tokio::test]
async fn test_first_sync_is_full_resync_and_stores_cursor() {
    let (protocol, local, store) = setup().await;
    protocol.queue_pull(Ok(pull_response(
        vec![note_entry(1, "a", 100, false), note_entry(2, "b", 120, false)],
        None,
        120,
    )));

    let report = store.sync(&CancellationToken::new()).await.unwrap();

    assert_eq!(protocol.pull_calls(), vec![(NOTES, None)]);
    assert_eq!(report.pulled, 2);
    assert_eq!(report.created, 2);
    assert_eq!(report.token, Some(token(120)));
    assert_eq!(local.load_token(NOTES).await.unwrap(), Some(token(120)));
    assert_eq!(status_of(local.as_ref(), NOTES, 1).await, Some(RecordStatus::Synced));
}

#[tokio::test]
async fn test_next_sync_pulls_since_stored_cursor() {
    let (protocol, _local, store) = setup().await;
    protocol.queue_pull(Ok(pull_response(vec![note_entry(1, "a", 100, false)], None, 100)));
    store.sync(&CancellationToken::new()).await.unwrap();

    let report = store.sync(&CancellationToken::new()).await.unwrap();

    assert_eq!(protocol.pull_calls()[1], (NOTES, Some(token(100))));
    assert_eq!(report.previous_token, Some(token(100)));
}

#[tokio::test]
async fn test_cursor_never_moves_backwards() {
    let (protocol, local, store) = setup().await;
    protocol.queue_pull(Ok(pull_response(vec![], None, 500)));
    store.sync(&CancellationToken::new()).await.unwrap();

    protocol.queue_pull(Ok(pull_response(vec![], Some(500), 300)));
    let report = store.sync(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.token, Some(token(500)));
    assert_eq!(local.load_token(NOTES).await.unwrap(), Some(token(500)));
}

#[tokio::test]
async fn test_report_counts_rows_actually_written() {
    let protocol = ScriptedProtocol::new();
    let sqlite = memory_store().await;
    let local = FlakyLocalStore::with_stale_lookups(sqlite.clone());
    let store = note_store(protocol.clone(), local, context());
    sqlite
        .save_local(NOTES, &id(1), note(1, "draft"), at(50))
        .await
        .unwrap();
    protocol.queue_push(Ok(PushResponse {
        results: vec![PushResult::Failure {
            failure_type: "conflict".to_string(),
            ids: EntryIds { id: id(1) },
            errors: None,
        }],
    }));
    protocol.queue_pull(Ok(pull_response(
        vec![note_entry(1, "server", 100, false), note_entry(2, "b", 100, false)],
        None,
        100,
    )));

    let report = store.sync(&CancellationToken::new()).await.unwrap();

    // Row 1 already exists, so only row 2 is inserted.
    assert_eq!(report.pulled, 2);
    assert_eq!(report.created, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.applied(), 1);
    let kept = row(sqlite.as_ref(), NOTES, 1).await.unwrap();
    assert_eq!(kept.data, note(1, "draft"));
    assert_eq!(kept.status, RecordStatus::Created);
}

#[tokio::test]
async fn test_server_update_overwrites_synced_row() {
    let (protocol, local, store) = setup().await;
    seed_synced(local.as_ref(), NOTES, 1, "old").await;
    protocol.queue_pull(Ok(pull_response(vec![note_entry(1, "new", 200, false)], None, 200)));

    let report = store.sync(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.updated, 1);
    let row = row(local.as_ref(), NOTES, 1).await.unwrap();
    assert_eq!(row.data, note(1, "new"));
    assert_eq!(row.updated_at, at(200));
}

#[tokio::test]
async fn test_tombstone_destroys_pending_update() {
    let (protocol, local, store) = setup().await;
    seed_synced(local.as_ref(), NOTES, 1, "a").await;
    local
        .save_local(NOTES, &id(1), note(1, "edited"), at(900))
        .await
        .unwrap();
    // The push is refused, so the local edit is still pending at pull time.
    protocol.queue_push(Ok(PushResponse {
        results: vec![PushResult::Failure {
            failure_type: "conflict".to_string(),
            ids: EntryIds { id: id(1) },
            errors: None,
        }],
    }));
    protocol.queue_pull(Ok(pull_response(vec![note_entry(1, "a", 150, true)], None, 150)));

    let report = store.sync(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.destroyed, 1);
    assert!(row(local.as_ref(), NOTES, 1).await.is_none());
}

#[tokio::test]
async fn test_newer_server_update_restores_pending_delete() {
    let (protocol, local, store) = setup().await;
    seed_synced(local.as_ref(), NOTES, 1, "a").await;
    local.delete_local(NOTES, &id(1), at(500)).await.unwrap();
    protocol.queue_push(Ok(PushResponse { results: vec![] }));
    protocol.queue_pull(Ok(pull_response(
        vec![note_entry(1, "revived", 600, false)],
        None,
        600,
    )));

    let report = store.sync(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.restored, 1);
    let row = row(local.as_ref(), NOTES, 1).await.unwrap();
    assert_eq!(row.status, RecordStatus::Synced);
    assert_eq!(row.data, note(1, "revived"));
    assert!(local.get(NOTES, &id(1)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_undecodable_entry_fails_without_advancing_cursor() {
    let (protocol, local, store) = setup().await;
    let mut bad = note_entry(1, "a", 100, false);
    bad.record = Some(serde_json::json!({ "unexpected": true }));
    protocol.queue_pull(Ok(pull_response(vec![bad], None, 100)));

    let err = store.sync(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, SyncError::Decode { collection: NOTES, .. }));
    assert!(!err.is_retryable());
    assert_eq!(local.load_token(NOTES).await.unwrap(), None);
}

#[tokio::test]
async fn test_pull_error_is_surfaced() {
    let (protocol, _local, store) = setup().await;
    protocol.queue_pull(Err(ProtocolError::Server {
        status: 503,
        message: "down".into(),
    }));

    let err = store.sync(&CancellationToken::new()).await.unwrap_err();
    assert!(err.is_retryable());
}

// ============================================================================
// Push
// ============================================================================

#[tokio::test]
async fn test_pending_create_is_pushed_and_acknowledged() {
    let (protocol, local, store) = setup().await;
    local
        .save_local(NOTES, &id(7), note(7, "draft"), at(50))
        .await
        .unwrap();

    let report = store.sync(&CancellationToken::new()).await.unwrap();

    let pushes = protocol.push_calls();
    assert_eq!(pushes.len(), 1);
    let (collection, payload) = &pushes[0];
    assert_eq!(*collection, NOTES);
    assert_eq!(payload.entries.len(), 1);
    assert!(!payload.entries[0].meta.deleted);
    assert_eq!(payload.entries[0].record, note(7, "draft"));

    assert_eq!(report.pushed, 1);
    let row = row(local.as_ref(), NOTES, 7).await.unwrap();
    assert_eq!(row.status, RecordStatus::Synced);
    assert_eq!(row.updated_at, at(SERVER_TIME));
}

#[tokio::test]
async fn test_pending_delete_is_pushed_and_removed() {
    let (protocol, local, store) = setup().await;
    seed_synced(local.as_ref(), NOTES, 3, "gone").await;
    local.delete_local(NOTES, &id(3), at(60)).await.unwrap();

    store.sync(&CancellationToken::new()).await.unwrap();

    let (_, payload) = &protocol.push_calls()[0];
    assert!(payload.entries[0].meta.deleted);
    assert!(row(local.as_ref(), NOTES, 3).await.is_none());
}

#[tokio::test]
async fn test_invalid_record_is_reported_and_stays_pending() {
    let (protocol, local, store) = setup().await;
    local
        .save_local(NOTES, &id(4), note(4, ""), at(50))
        .await
        .unwrap();
    protocol.queue_push(Ok(PushResponse {
        results: vec![PushResult::Failure {
            failure_type: FAILURE_TYPE_INVALID.to_string(),
            ids: EntryIds { id: id(4) },
            errors: Some(
                [("value".to_string(), vec!["must not be empty".to_string()])]
                    .into_iter()
                    .collect(),
            ),
        }],
    }));

    let report = store.sync(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.pushed, 0);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].id, id(4));
    assert_eq!(report.rejected[0].errors["value"], vec!["must not be empty"]);
    assert_eq!(status_of(local.as_ref(), NOTES, 4).await, Some(RecordStatus::Created));
}

/// Protocol that edits the pushed row locally while the push is in flight
struct EditingProtocol {
    inner: Arc<ScriptedProtocol>,
    local: Arc<dyn ILocalStore>,
}

#[async_trait::async_trait]
impl ISyncProtocol for EditingProtocol {
    async fn pull(
        &self,
        collection: Collection,
        since: Option<SyncToken>,
    ) -> Result<PullResponse, ProtocolError> {
        self.inner.pull(collection, since).await
    }

    async fn push(
        &self,
        collection: Collection,
        payload: PushPayload,
    ) -> Result<PushResponse, ProtocolError> {
        let pushed = payload.entries[0].id().clone();
        self.local
            .save_local(collection, &pushed, note(5, "second"), at(60))
            .await
            .unwrap();
        self.inner.push(collection, payload).await
    }
}

#[tokio::test]
async fn test_local_edit_during_push_is_not_overwritten() {
    let scripted = ScriptedProtocol::new();
    let local = memory_store().await;
    local
        .save_local(NOTES, &id(5), note(5, "first"), at(50))
        .await
        .unwrap();
    let protocol = Arc::new(EditingProtocol {
        inner: scripted.clone(),
        local: local.clone(),
    });
    let store = SyncStore::new(
        SyncStoreConfig::<Note>::new(protocol, local.clone()),
        context(),
    );

    let report = store.sync(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.pushed, 1);
    assert_eq!(report.skipped, 1);
    let row = row(local.as_ref(), NOTES, 5).await.unwrap();
    assert_eq!(row.data, note(5, "second"));
    assert!(row.status.is_pending());
}

// ============================================================================
// Cancellation, failures, notifications
// ============================================================================

#[tokio::test]
async fn test_cancelled_cycle_changes_nothing() {
    let (protocol, local, store) = setup().await;
    local
        .save_local(NOTES, &id(1), note(1, "draft"), at(50))
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = store.sync(&cancel).await.unwrap_err();

    assert!(matches!(err, SyncError::Cancelled));
    assert!(protocol.push_calls().is_empty());
    assert!(protocol.pull_calls().is_empty());
    assert_eq!(status_of(local.as_ref(), NOTES, 1).await, Some(RecordStatus::Created));
}

#[tokio::test]
async fn test_cancel_interrupts_stalled_pull() {
    let (protocol, local, store) = setup().await;
    let store = Arc::new(store);
    let (entered, _release) = protocol.hold_pulls();
    let cancel = CancellationToken::new();

    let running = {
        let store = Arc::clone(&store);
        let cancel = cancel.clone();
        tokio::spawn(async move { store.sync(&cancel).await })
    };
    entered.notified().await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), running)
        .await
        .expect("sync returns once cancelled")
        .unwrap();
    assert!(matches!(result, Err(SyncError::Cancelled)));
    assert_eq!(local.load_token(NOTES).await.unwrap(), None);
}

#[tokio::test]
async fn test_write_made_offline_is_synced_after_reconnect() {
    let protocol = ScriptedProtocol::new();
    let local = memory_store().await;
    let connectivity = Arc::new(ConnectivitySource::new(true));
    let context = Arc::new(
        SyncContext::builder()
            .connectivity(connectivity.clone())
            .build(),
    );
    let store = note_store(protocol.clone(), local.clone(), context);
    local
        .save_local(NOTES, &id(8), note(8, "written offline"), at(50))
        .await
        .unwrap();

    let outcome = store
        .request_sync("polling", &CancellationToken::new())
        .await;
    assert!(matches!(outcome, ExecutionOutcome::Unreachable));
    assert!(protocol.push_calls().is_empty());
    assert_eq!(status_of(local.as_ref(), NOTES, 8).await, Some(RecordStatus::Created));

    connectivity.set_offline(false);
    let report = store
        .request_sync("reconnected", &CancellationToken::new())
        .await
        .completed()
        .expect("sync completes after reconnect");
    assert_eq!(report.pushed, 1);

    // The server hands the same record back on the following pull.
    protocol.queue_pull(Ok(pull_response(
        vec![note_entry(8, "written offline", SERVER_TIME, false)],
        None,
        SERVER_TIME,
    )));
    store
        .request_sync("polling", &CancellationToken::new())
        .await
        .completed()
        .expect("follow-up sync completes");

    let row = row(local.as_ref(), NOTES, 8).await.unwrap();
    assert_eq!(row.status, RecordStatus::Synced);
    assert_eq!(row.data, note(8, "written offline"));
}

#[tokio::test]
async fn test_failed_apply_is_retried_and_keeps_cursor_until_commit() {
    let protocol = ScriptedProtocol::new();
    let sqlite = memory_store().await;
    let flaky = FlakyLocalStore::new(sqlite.clone(), 1);
    let store = note_store(protocol.clone(), flaky, context());
    protocol.queue_pull(Ok(pull_response(vec![note_entry(1, "a", 100, false)], None, 100)));
    protocol.queue_pull(Ok(pull_response(vec![note_entry(1, "a", 100, false)], None, 100)));

    let outcome = store
        .request_sync("initial", &CancellationToken::new())
        .await;

    let report = outcome.completed().expect("second attempt completes");
    assert_eq!(report.token, Some(token(100)));
    // Both attempts pulled from scratch because the first never committed.
    assert_eq!(protocol.pull_calls(), vec![(NOTES, None), (NOTES, None)]);
    assert_eq!(sqlite.load_token(NOTES).await.unwrap(), Some(token(100)));
}

#[tokio::test]
async fn test_non_retryable_failure_is_reported_once() {
    let (protocol, _local, store) = setup().await;
    protocol.queue_pull(Err(ProtocolError::Unauthorized("expired".into())));

    let outcome = store
        .request_sync("polling", &CancellationToken::new())
        .await;

    assert!(matches!(
        outcome,
        ExecutionOutcome::Failed(SyncError::Protocol(ProtocolError::Unauthorized(_)))
    ));
    assert_eq!(protocol.pull_calls().len(), 1);
}

#[tokio::test]
async fn test_change_is_announced_on_bus() {
    let protocol = ScriptedProtocol::new();
    let local = memory_store().await;
    let bus = Arc::new(LocalMessageBus::new());
    let context = Arc::new(SyncContext::builder().bus(bus.clone()).build());
    let store = note_store(protocol.clone(), local, context);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _sub = bus.on_message(listener(move |signal| {
        let _ = tx.send(signal);
    }));

    // Nothing changes: no announcement.
    store.sync(&CancellationToken::new()).await.unwrap();
    protocol.queue_pull(Ok(pull_response(vec![note_entry(1, "a", 100, false)], None, 100)));
    store.sync(&CancellationToken::new()).await.unwrap();

    let signal = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap();
    assert_eq!(signal, Some(SyncSignal::CollectionChanged { collection: NOTES }));
    assert!(rx.try_recv().is_err());
}

// ============================================================================
// Soft delete
// ============================================================================

#[tokio::test]
async fn test_grace_period_keeps_destroyed_rows_undoable() {
    let protocol = ScriptedProtocol::new();
    let local = memory_store().await;
    let config = SyncStoreConfig::<Note>::new(protocol.clone(), local.clone())
        .with_purge_grace_period(Some(Duration::from_secs(3600)));
    let store = SyncStore::new(config, context());
    seed_synced(local.as_ref(), NOTES, 1, "a").await;
    protocol.queue_pull(Ok(pull_response(vec![note_entry(1, "a", 150, true)], None, 150)));

    store.sync(&CancellationToken::new()).await.unwrap();

    assert!(local.get(NOTES, &id(1)).await.unwrap().is_none());
    let hidden = row(local.as_ref(), NOTES, 1).await.unwrap();
    assert!(hidden.deleted_at.is_some());

    assert!(local.undo_delete(NOTES, &id(1), at(2000)).await.unwrap());
    assert_eq!(status_of(local.as_ref(), NOTES, 1).await, Some(RecordStatus::Updated));
}

#[tokio::test]
async fn test_expired_soft_deletes_are_purged_next_cycle() {
    let protocol = ScriptedProtocol::new();
    let local = memory_store().await;
    let config = SyncStoreConfig::<Note>::new(protocol.clone(), local.clone())
        .with_purge_grace_period(Some(Duration::ZERO));
    let store = SyncStore::new(config, context());
    seed_synced(local.as_ref(), NOTES, 1, "a").await;
    protocol.queue_pull(Ok(pull_response(vec![note_entry(1, "a", 150, true)], None, 150)));

    store.sync(&CancellationToken::new()).await.unwrap();
    assert!(row(local.as_ref(), NOTES, 1).await.is_some());

    tokio::time::sleep(Duration::from_millis(5)).await;
    let report = store.sync(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.purged, 1);
    assert!(row(local.as_ref(), NOTES, 1).await.is_none());
}
