//! Per-collection sync store
//!
//! One [`SyncStore`] owns the sync cycle of one collection:
//!
//! 1. purge soft-deleted rows whose grace period has passed
//! 2. push pending mutations and apply the acknowledgements, guarded by
//!    the revision each row had when it was pushed
//! 3. pull everything since the stored cursor, resolve it against local
//!    state and commit the result together with the new cursor
//! 4. announce the change on the message bus
//!
//! Network calls race the cancellation token, and cancellation is checked
//! again before each local commit, so a cancelled cycle never leaves
//! half-applied state behind.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cadence_conflict::{Comparator, SyncResolver, UpdatedAtComparator};
use cadence_core::domain::{
    Collection, EntryIds, LocalRecord, PushEntry, PushEntryMeta, PushPayload, PushResult,
    RecordId, RecordStatus, StoredRecord, SyncEntry, SyncToken, Syncable, FAILURE_TYPE_INVALID,
};
use cadence_core::ports::{
    ChangeBatch, CycleSummary, DestroyMode, ILocalStore, ISyncProtocol, NewRecord, Overwrite,
    SyncSignal,
};

use crate::backoff::BackoffPolicy;
use crate::context::SyncContext;
use crate::executor::{ExecutionOutcome, ExecutorState, SyncExecutor};
use crate::retry::SyncRetry;
use crate::SyncError;

// ============================================================================
// Configuration and report
// ============================================================================

/// Dependencies of one store
pub struct SyncStoreConfig<T> {
    pub protocol: Arc<dyn ISyncProtocol>,
    pub local: Arc<dyn ILocalStore>,
    pub comparator: Arc<dyn Comparator<T>>,
    /// Keep destroyed rows hidden this long so deletions can be undone;
    /// `None` purges immediately
    pub purge_grace_period: Option<Duration>,
    pub backoff: BackoffPolicy,
}

impl<T: Syncable> SyncStoreConfig<T> {
    /// Last-writer-wins by `updated_at`, immediate purge, default backoff
    pub fn new(protocol: Arc<dyn ISyncProtocol>, local: Arc<dyn ILocalStore>) -> Self {
        Self {
            protocol,
            local,
            comparator: Arc::new(UpdatedAtComparator),
            purge_grace_period: None,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_comparator(mut self, comparator: Arc<dyn Comparator<T>>) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn with_purge_grace_period(mut self, grace: Option<Duration>) -> Self {
        self.purge_grace_period = grace;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// A pushed record the server refused on validation grounds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRecord {
    pub id: RecordId,
    pub failure_type: String,
    /// Field name to validation messages
    pub errors: HashMap<String, Vec<String>>,
}

/// What one completed cycle did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub collection: Collection,
    /// Push results accepted by the server
    pub pushed: u64,
    pub rejected: Vec<RejectedRecord>,
    /// Entries received from the pull
    pub pulled: u64,
    pub created: u64,
    pub updated: u64,
    pub restored: u64,
    pub destroyed: u64,
    pub marked_synced: u64,
    /// Guarded writes skipped because the row changed locally meanwhile
    pub skipped: u64,
    pub purged: u64,
    /// The cursor the pull was made with
    pub previous_token: Option<SyncToken>,
    /// The cursor stored after the pull
    pub token: Option<SyncToken>,
    pub duration_ms: u64,
}

impl SyncReport {
    fn new(collection: Collection) -> Self {
        Self {
            collection,
            pushed: 0,
            rejected: Vec::new(),
            pulled: 0,
            created: 0,
            updated: 0,
            restored: 0,
            destroyed: 0,
            marked_synced: 0,
            skipped: 0,
            purged: 0,
            previous_token: None,
            token: None,
            duration_ms: 0,
        }
    }

    /// Rows changed by the pull resolution
    pub fn applied(&self) -> u64 {
        self.created + self.updated + self.restored + self.destroyed + self.marked_synced
    }

    pub fn summary(&self) -> CycleSummary {
        CycleSummary {
            pushed: self.pushed,
            rejected: self.rejected.len() as u64,
            pulled: self.pulled,
            applied: self.applied(),
        }
    }
}

// ============================================================================
// ManagedStore
// ============================================================================

/// Type-erased store as seen by the orchestrator and the registry
#[async_trait]
pub trait ManagedStore: Send + Sync {
    fn collection(&self) -> Collection;

    fn executor_state(&self) -> ExecutorState;

    /// Run one cycle through the single-flight executor
    async fn request_sync(
        &self,
        reason: &str,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome<SyncReport>;
}

// ============================================================================
// SyncStore
// ============================================================================

/// Sync cycle of the collection records of type `T` live in
pub struct SyncStore<T: Syncable> {
    protocol: Arc<dyn ISyncProtocol>,
    local: Arc<dyn ILocalStore>,
    comparator: Arc<dyn Comparator<T>>,
    purge_grace_period: Option<Duration>,
    context: Arc<SyncContext>,
    executor: SyncExecutor,
    _record: PhantomData<fn() -> T>,
}

impl<T: Syncable> SyncStore<T> {
    pub fn new(config: SyncStoreConfig<T>, context: Arc<SyncContext>) -> Self {
        let retry = SyncRetry::new(
            T::COLLECTION,
            config.backoff,
            Arc::clone(context.connectivity()),
        );
        let executor = SyncExecutor::new(T::COLLECTION, retry, Arc::clone(context.telemetry()));
        Self {
            protocol: config.protocol,
            local: config.local,
            comparator: config.comparator,
            purge_grace_period: config.purge_grace_period,
            context,
            executor,
            _record: PhantomData,
        }
    }

    pub fn collection(&self) -> Collection {
        T::COLLECTION
    }

    pub fn executor(&self) -> &SyncExecutor {
        &self.executor
    }

    /// Run one full cycle without the executor's gating or retries
    #[tracing::instrument(skip(self, cancel), fields(collection = %T::COLLECTION))]
    pub async fn sync(&self, cancel: &CancellationToken) -> Result<SyncReport, SyncError> {
        let started = tokio::time::Instant::now();
        let mut report = SyncReport::new(T::COLLECTION);

        report.purged = self.purge_expired().await?;
        let pushed_changes = self.push(cancel, &mut report).await?;
        let pulled_changes = self.pull(cancel, &mut report).await?;

        if pushed_changes || pulled_changes {
            self.context.bus().publish(SyncSignal::CollectionChanged {
                collection: T::COLLECTION,
            });
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            pushed = report.pushed,
            rejected = report.rejected.len(),
            pulled = report.pulled,
            applied = report.applied(),
            skipped = report.skipped,
            token = ?report.token.map(|t| t.as_secs()),
            duration_ms = report.duration_ms,
            "Sync cycle complete"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Purge
    // ------------------------------------------------------------------------

    async fn purge_expired(&self) -> Result<u64, SyncError> {
        let Some(grace) = self.purge_grace_period else {
            return Ok(0);
        };
        let Some(before) = chrono::Duration::from_std(grace)
            .ok()
            .and_then(|grace| Utc::now().checked_sub_signed(grace))
        else {
            return Ok(0);
        };

        let purged = self
            .local
            .purge_deleted(T::COLLECTION, before)
            .await
            .map_err(SyncError::LocalApply)?;
        if purged > 0 {
            debug!(purged, "Purged soft-deleted rows past their grace period");
        }
        Ok(purged)
    }

    fn destroy_mode(&self) -> DestroyMode {
        match self.purge_grace_period {
            Some(_) => DestroyMode::SoftDelete { at: Utc::now() },
            None => DestroyMode::Purge,
        }
    }

    fn ensure_active(cancel: &CancellationToken) -> Result<(), SyncError> {
        if cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------------
    // Push
    // ------------------------------------------------------------------------

    /// Returns whether any local row changed
    async fn push(
        &self,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) -> Result<bool, SyncError> {
        let pending = self
            .local
            .pending(T::COLLECTION)
            .await
            .map_err(SyncError::LocalRead)?;
        if pending.is_empty() {
            return Ok(false);
        }

        let payload = PushPayload {
            entries: pending.iter().map(push_entry).collect(),
        };
        let snapshot: HashMap<RecordId, StoredRecord> = pending
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();

        Self::ensure_active(cancel)?;
        debug!(entries = payload.entries.len(), "Pushing pending records");
        let response = cancellable(cancel, self.protocol.push(T::COLLECTION, payload)).await??;
        Self::ensure_active(cancel)?;

        let mut batch = ChangeBatch {
            destroy_mode: self.destroy_mode(),
            ..Default::default()
        };
        let mut answered = HashSet::new();

        for result in response.results {
            let Some(local) = snapshot.get(result.id()) else {
                warn!(id = %result.id(), "Push result for a record that was not pushed");
                continue;
            };
            if !answered.insert(local.id.clone()) {
                warn!(id = %local.id, "Duplicate push result ignored");
                continue;
            }

            match result {
                PushResult::Success { entry } => {
                    if self.acknowledge(local, entry, &mut batch) {
                        report.pushed += 1;
                    }
                }
                PushResult::Failure {
                    failure_type,
                    ids,
                    errors,
                } if failure_type == FAILURE_TYPE_INVALID => {
                    warn!(id = %ids.id, "Server rejected record as invalid");
                    report.rejected.push(RejectedRecord {
                        id: ids.id,
                        failure_type,
                        errors: errors.unwrap_or_default(),
                    });
                }
                PushResult::Failure {
                    failure_type, ids, ..
                } => {
                    warn!(id = %ids.id, failure_type, "Push failed, record stays pending");
                }
            }
        }

        let unanswered = snapshot.len() - answered.len();
        if unanswered > 0 {
            warn!(unanswered, "Push response omitted records, they stay pending");
        }

        Self::ensure_active(cancel)?;
        let stats = self
            .local
            .apply(T::COLLECTION, batch)
            .await
            .map_err(SyncError::LocalApply)?;
        report.skipped += stats.skipped;
        Ok(stats.changed() > 0)
    }

    /// Queue the local effect of an accepted push; false when the server
    /// view cannot be used
    fn acknowledge(
        &self,
        local: &StoredRecord,
        entry: SyncEntry,
        batch: &mut ChangeBatch,
    ) -> bool {
        if local.status == RecordStatus::Deleted || entry.is_tombstone() {
            batch.guarded_destroys.push(local.version());
            return true;
        }

        let created_at = entry.meta.lifecycle.created_at;
        let updated_at = entry.updated_at();
        let id = entry.id().clone();
        match entry.decode::<T>() {
            Ok(SyncEntry {
                record: Some(record),
                ..
            }) => match serde_json::to_value(record) {
                Ok(data) => {
                    batch.overwrites.push(Overwrite {
                        expected: local.version(),
                        data,
                        created_at,
                        updated_at,
                    });
                    true
                }
                Err(e) => {
                    warn!(%id, error = %e, "Could not encode acknowledged record");
                    false
                }
            },
            Ok(_) => {
                batch.mark_synced.push(local.version());
                true
            }
            Err(e) => {
                warn!(%id, error = %e, "Acknowledged record does not decode, leaving it pending");
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Pull
    // ------------------------------------------------------------------------

    /// Returns whether any local row changed
    async fn pull(
        &self,
        cancel: &CancellationToken,
        report: &mut SyncReport,
    ) -> Result<bool, SyncError> {
        let since = self
            .local
            .load_token(T::COLLECTION)
            .await
            .map_err(SyncError::LocalRead)?;

        Self::ensure_active(cancel)?;
        let response = cancellable(cancel, self.protocol.pull(T::COLLECTION, since)).await??;

        let next = response.meta.next_token();
        let token = SyncToken::advance(since, next);
        if token != next {
            warn!(
                since = ?since.map(|t| t.as_secs()),
                next = next.as_secs(),
                "Server cursor moved backwards, keeping the stored one"
            );
        }
        report.previous_token = response.meta.since.or(since);
        report.pulled = response.entries.len() as u64;

        let entries = response
            .entries
            .into_iter()
            .map(|entry| entry.decode::<T>())
            .collect::<Result<Vec<SyncEntry<T>>, _>>()
            .map_err(|source| SyncError::Decode {
                collection: T::COLLECTION,
                source,
            })?;

        let ids: Vec<RecordId> = entries.iter().map(|e| e.id().clone()).collect();
        let locals = self.load_locals(&ids).await?;

        let resolution = SyncResolver::new(self.comparator.as_ref()).resolve_batch(entries, locals);

        let mut batch = ChangeBatch {
            destroy_mode: self.destroy_mode(),
            token: Some(token),
            ..Default::default()
        };

        for entry in resolution.entries_for_create {
            let created_at = entry.meta.lifecycle.created_at;
            let updated_at = entry.updated_at();
            let id = entry.meta.ids.id;
            if let Some(record) = entry.record {
                batch.creates.push(NewRecord {
                    id,
                    data: encode(&record)?,
                    created_at,
                    updated_at,
                });
            }
        }
        batch.overwrites = overwrites(resolution.tuples_for_update)?;
        batch.restores = overwrites(resolution.tuples_for_restore)?;
        batch.destroys = resolution.ids_for_destroy;
        batch.mark_synced = resolution
            .records_for_synced
            .iter()
            .map(LocalRecord::version)
            .collect();

        Self::ensure_active(cancel)?;
        let stats = self
            .local
            .apply(T::COLLECTION, batch)
            .await
            .map_err(SyncError::LocalApply)?;

        report.token = Some(token);
        report.created = stats.created;
        report.updated = stats.overwritten;
        report.restored = stats.restored;
        report.destroyed = stats.destroyed;
        report.marked_synced = stats.marked_synced;
        report.skipped += stats.skipped;
        Ok(stats.changed() > 0)
    }

    async fn load_locals(
        &self,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, LocalRecord<T>>, SyncError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = self
            .local
            .find_by_ids(T::COLLECTION, ids)
            .await
            .map_err(SyncError::LocalRead)?;

        rows.into_iter()
            .map(|row| {
                row.decode::<T>()
                    .map(|local| (local.id.clone(), local))
                    .map_err(|source| SyncError::Decode {
                        collection: T::COLLECTION,
                        source,
                    })
            })
            .collect()
    }
}

fn push_entry(record: &StoredRecord) -> PushEntry {
    PushEntry {
        record: record.data.clone(),
        meta: PushEntryMeta {
            ids: EntryIds {
                id: record.id.clone(),
            },
            deleted: record.status == RecordStatus::Deleted,
        },
    }
}

/// Guarded overwrites for resolved `(local, server)` pairs
fn overwrites<T: Syncable>(
    pairs: Vec<(LocalRecord<T>, SyncEntry<T>)>,
) -> Result<Vec<Overwrite>, SyncError> {
    let mut out = Vec::with_capacity(pairs.len());
    for (local, entry) in pairs {
        let created_at = entry.meta.lifecycle.created_at;
        let updated_at = entry.updated_at();
        if let Some(record) = entry.record {
            out.push(Overwrite {
                expected: local.version(),
                data: encode(&record)?,
                created_at,
                updated_at,
            });
        }
    }
    Ok(out)
}

/// Runs a suspending call unless `cancel` fires first
async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    call: F,
) -> Result<F::Output, SyncError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        output = call => Ok(output),
    }
}

fn encode<T: Syncable>(record: &T) -> Result<serde_json::Value, SyncError> {
    serde_json::to_value(record).map_err(|source| SyncError::Decode {
        collection: T::COLLECTION,
        source,
    })
}

#[async_trait]
impl<T: Syncable> ManagedStore for SyncStore<T> {
    fn collection(&self) -> Collection {
        T::COLLECTION
    }

    fn executor_state(&self) -> ExecutorState {
        self.executor.state()
    }

    async fn request_sync(
        &self,
        reason: &str,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome<SyncReport> {
        let telemetry = self.context.telemetry();
        self.executor
            .request(reason, cancel, || async move {
                telemetry.cycle_started(T::COLLECTION, reason);
                let report = self.sync(cancel).await?;
                telemetry.cycle_finished(
                    T::COLLECTION,
                    &report.summary(),
                    Duration::from_millis(report.duration_ms),
                );
                Ok::<_, SyncError>(report)
            })
            .await
    }
}
