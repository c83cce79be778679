//! Shared fixtures: scripted protocol, failure-injecting local store

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::Notify;

use cadence_cache::{DatabasePool, SqliteLocalStore};
use cadence_core::domain::{
    Collection, EntryIds, EntryMeta, Lifecycle, PullMeta, PullResponse, PushPayload,
    PushResponse, PushResult, RecordId, RecordStatus, StoredRecord, SyncEntry, SyncToken,
};
use cadence_core::ports::{ApplyStats, ChangeBatch, ILocalStore, ISyncProtocol, ProtocolError};
use cadence_sync::{BackoffPolicy, SyncContext};

/// Server clock used by default responses
pub const SERVER_TIME: i64 = 1_000;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn id(n: u64) -> RecordId {
    RecordId::from(n)
}

pub fn token(secs: i64) -> SyncToken {
    SyncToken::new(secs).unwrap()
}

pub fn note(n: u64, value: &str) -> Value {
    json!({ "content_id": n, "value": value })
}

/// Backoff short enough for tests on a real clock
pub fn fast_backoff(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy {
        base: Duration::from_millis(1),
        max: Duration::from_millis(4),
        max_attempts,
        jitter: 0.0,
    }
}

pub fn note_entry(n: u64, value: &str, updated_at: i64, deleted: bool) -> SyncEntry {
    SyncEntry {
        record: (!deleted).then(|| note(n, value)),
        meta: EntryMeta {
            ids: EntryIds { id: id(n) },
            lifecycle: Lifecycle {
                created_at: at(1),
                updated_at: at(updated_at),
                deleted_at: deleted.then(|| at(updated_at)),
            },
        },
    }
}

pub fn pull_response(entries: Vec<SyncEntry>, since: Option<i64>, max_stamp: i64) -> PullResponse {
    PullResponse {
        entries,
        meta: PullMeta {
            since: since.map(token),
            max_stamp: Some(token(max_stamp)),
            timestamp: token(SERVER_TIME),
        },
    }
}

pub async fn memory_store() -> Arc<SqliteLocalStore> {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    Arc::new(SqliteLocalStore::new(pool.pool().clone()))
}

pub fn context() -> Arc<SyncContext> {
    Arc::new(SyncContext::builder().build())
}

/// Seed a synced row through a pull-style create
pub async fn seed_synced(local: &dyn ILocalStore, collection: Collection, n: u64, value: &str) {
    let batch = ChangeBatch {
        creates: vec![cadence_core::ports::NewRecord {
            id: id(n),
            data: note(n, value),
            created_at: at(1),
            updated_at: at(100),
        }],
        ..Default::default()
    };
    local.apply(collection, batch).await.unwrap();
}

pub async fn row(local: &dyn ILocalStore, collection: Collection, n: u64) -> Option<StoredRecord> {
    local
        .find_by_ids(collection, &[id(n)])
        .await
        .unwrap()
        .into_iter()
        .next()
}

pub async fn status_of(local: &dyn ILocalStore, collection: Collection, n: u64) -> Option<RecordStatus> {
    row(local, collection, n).await.map(|r| r.status)
}

// ============================================================================
// ScriptedProtocol
// ============================================================================

/// Pulls that block until released, optionally for one collection only
#[derive(Clone)]
struct PullGate {
    collection: Option<Collection>,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

/// Protocol that replays queued responses and records requests
///
/// With nothing queued, a pull returns no entries and a push accepts every
/// entry as-is.
#[derive(Default)]
pub struct ScriptedProtocol {
    pulls: Mutex<VecDeque<Result<PullResponse, ProtocolError>>>,
    pushes: Mutex<VecDeque<Result<PushResponse, ProtocolError>>>,
    pull_calls: Mutex<Vec<(Collection, Option<SyncToken>)>>,
    push_calls: Mutex<Vec<(Collection, PushPayload)>>,
    gate: Mutex<Option<PullGate>>,
}

impl ScriptedProtocol {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_pull(&self, response: Result<PullResponse, ProtocolError>) {
        self.pulls.lock().unwrap().push_back(response);
    }

    pub fn queue_push(&self, response: Result<PushResponse, ProtocolError>) {
        self.pushes.lock().unwrap().push_back(response);
    }

    pub fn pull_calls(&self) -> Vec<(Collection, Option<SyncToken>)> {
        self.pull_calls.lock().unwrap().clone()
    }

    pub fn pulled_collections(&self) -> Vec<Collection> {
        self.pull_calls().into_iter().map(|(c, _)| c).collect()
    }

    pub fn push_calls(&self) -> Vec<(Collection, PushPayload)> {
        self.push_calls.lock().unwrap().clone()
    }

    /// Make the next pulls block until `release` is notified; `entered` is
    /// notified when a pull starts waiting
    pub fn hold_pulls(&self) -> (Arc<Notify>, Arc<Notify>) {
        self.install_gate(None)
    }

    /// Like [`hold_pulls`](Self::hold_pulls), for one collection only
    pub fn hold_pulls_of(&self, collection: Collection) -> (Arc<Notify>, Arc<Notify>) {
        self.install_gate(Some(collection))
    }

    fn install_gate(&self, collection: Option<Collection>) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(PullGate {
            collection,
            entered: entered.clone(),
            release: release.clone(),
        });
        (entered, release)
    }

    pub fn pulls_of(&self, collection: Collection) -> usize {
        self.pulled_collections()
            .into_iter()
            .filter(|c| *c == collection)
            .count()
    }
}

fn accept_all(payload: &PushPayload) -> PushResponse {
    PushResponse {
        results: payload
            .entries
            .iter()
            .map(|entry| {
                let deleted = entry.meta.deleted;
                PushResult::Success {
                    entry: SyncEntry {
                        record: (!deleted).then(|| entry.record.clone()),
                        meta: EntryMeta {
                            ids: entry.meta.ids.clone(),
                            lifecycle: Lifecycle {
                                created_at: at(SERVER_TIME),
                                updated_at: at(SERVER_TIME),
                                deleted_at: deleted.then(|| at(SERVER_TIME)),
                            },
                        },
                    },
                }
            })
            .collect(),
    }
}

#[async_trait::async_trait]
impl ISyncProtocol for ScriptedProtocol {
    async fn pull(
        &self,
        collection: Collection,
        since: Option<SyncToken>,
    ) -> Result<PullResponse, ProtocolError> {
        self.pull_calls.lock().unwrap().push((collection, since));

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate.filter(|g| g.collection.map_or(true, |c| c == collection)) {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        let queued = self.pulls.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| {
            Ok(PullResponse {
                entries: Vec::new(),
                meta: PullMeta {
                    since,
                    max_stamp: None,
                    timestamp: token(SERVER_TIME),
                },
            })
        })
    }

    async fn push(
        &self,
        collection: Collection,
        payload: PushPayload,
    ) -> Result<PushResponse, ProtocolError> {
        self.push_calls
            .lock()
            .unwrap()
            .push((collection, payload.clone()));
        let queued = self.pushes.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| Ok(accept_all(&payload)))
    }
}

// ============================================================================
// FlakyLocalStore
// ============================================================================

/// Delegating store whose `apply` fails a set number of times
pub struct FlakyLocalStore {
    inner: Arc<dyn ILocalStore>,
    apply_failures: AtomicU32,
    stale_lookups: bool,
}

impl FlakyLocalStore {
    pub fn new(inner: Arc<dyn ILocalStore>, apply_failures: u32) -> Arc<Self> {
        Arc::new(Self {
            inner,
            apply_failures: AtomicU32::new(apply_failures),
            stale_lookups: false,
        })
    }

    /// A store whose id lookups find nothing, as if every row were written
    /// after the resolver looked
    pub fn with_stale_lookups(inner: Arc<dyn ILocalStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            apply_failures: AtomicU32::new(0),
            stale_lookups: true,
        })
    }
}

#[async_trait::async_trait]
impl ILocalStore for FlakyLocalStore {
    async fn load_token(&self, collection: Collection) -> anyhow::Result<Option<SyncToken>> {
        self.inner.load_token(collection).await
    }

    async fn pending(&self, collection: Collection) -> anyhow::Result<Vec<StoredRecord>> {
        self.inner.pending(collection).await
    }

    async fn find_by_ids(
        &self,
        collection: Collection,
        ids: &[RecordId],
    ) -> anyhow::Result<Vec<StoredRecord>> {
        if self.stale_lookups {
            return Ok(Vec::new());
        }
        self.inner.find_by_ids(collection, ids).await
    }

    async fn apply(
        &self,
        collection: Collection,
        batch: ChangeBatch,
    ) -> anyhow::Result<ApplyStats> {
        let remaining = self.apply_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.apply_failures.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("database is locked");
        }
        self.inner.apply(collection, batch).await
    }

    async fn purge_deleted(&self, collection: Collection, before: DateTime<Utc>) -> anyhow::Result<u64> {
        self.inner.purge_deleted(collection, before).await
    }

    async fn get(&self, collection: Collection, id: &RecordId) -> anyhow::Result<Option<StoredRecord>> {
        self.inner.get(collection, id).await
    }

    async fn get_many(
        &self,
        collection: Collection,
        ids: &[RecordId],
    ) -> anyhow::Result<Vec<StoredRecord>> {
        self.inner.get_many(collection, ids).await
    }

    async fn list(&self, collection: Collection) -> anyhow::Result<Vec<StoredRecord>> {
        self.inner.list(collection).await
    }

    async fn save_local(
        &self,
        collection: Collection,
        id: &RecordId,
        data: Value,
        now: DateTime<Utc>,
    ) -> anyhow::Result<StoredRecord> {
        self.inner.save_local(collection, id, data, now).await
    }

    async fn delete_local(
        &self,
        collection: Collection,
        id: &RecordId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        self.inner.delete_local(collection, id, now).await
    }

    async fn undo_delete(
        &self,
        collection: Collection,
        id: &RecordId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        self.inner.undo_delete(collection, id, now).await
    }

    async fn status_counts(
        &self,
        collection: Collection,
    ) -> anyhow::Result<HashMap<RecordStatus, u64>> {
        self.inner.status_counts(collection).await
    }

    async fn wipe_all(&self) -> anyhow::Result<()> {
        self.inner.wipe_all().await
    }
}

/// Poll `check` until it holds or a second passes
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
