//! Local store port (driven/secondary port)
//!
//! This module defines the interface for the local persisted snapshot of
//! every collection: record rows with their lifecycle status, plus the
//! per-collection pull cursor.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because persistence errors are adapter-specific.
//! - [`ILocalStore::apply`] is all-or-nothing: either every change in the
//!   batch (including the cursor) is committed, or none is.
//! - Read methods (`get`, `get_many`, `list`) only return live rows:
//!   pending-delete and soft-deleted rows are hidden.
//! - Resolver-facing reads (`find_by_ids`, `pending`) see every row.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{Collection, RecordId, RecordStatus, RecordVersion, StoredRecord, SyncToken};

// ============================================================================
// Change batches
// ============================================================================

/// How destroyed rows leave the local store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DestroyMode {
    /// Delete the row immediately
    #[default]
    Purge,
    /// Keep the row hidden until a later purge, so the deletion can be undone
    SoftDelete { at: DateTime<Utc> },
}

/// A server record to insert as synced
///
/// Inserting is a no-op when a row with the same id already exists.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub id: RecordId,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Replace a local row's body with the server's and mark it synced
///
/// Applied only while the row is still at `expected.revision`.
#[derive(Debug, Clone, PartialEq)]
pub struct Overwrite {
    pub expected: RecordVersion,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything one sync step writes to a collection, committed atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeBatch {
    pub creates: Vec<NewRecord>,
    pub overwrites: Vec<Overwrite>,
    /// Pending deletions the server outlived, applied like overwrites
    pub restores: Vec<Overwrite>,
    /// Rows to mark synced without changing data, guarded by revision
    pub mark_synced: Vec<RecordVersion>,
    /// Rows destroyed regardless of local state
    pub destroys: Vec<RecordId>,
    /// Rows destroyed only while still at the given revision
    pub guarded_destroys: Vec<RecordVersion>,
    pub destroy_mode: DestroyMode,
    /// New cursor, written in the same transaction
    pub token: Option<SyncToken>,
}

impl ChangeBatch {
    /// True when the batch would not touch any row or the cursor
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty()
            && self.overwrites.is_empty()
            && self.restores.is_empty()
            && self.mark_synced.is_empty()
            && self.destroys.is_empty()
            && self.guarded_destroys.is_empty()
            && self.token.is_none()
    }
}

/// Row counts actually changed by [`ILocalStore::apply`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub created: u64,
    pub overwritten: u64,
    pub restored: u64,
    pub marked_synced: u64,
    pub destroyed: u64,
    /// Guarded changes skipped because the row moved on locally
    pub skipped: u64,
}

impl ApplyStats {
    /// Number of rows whose content or status changed
    pub fn changed(&self) -> u64 {
        self.created + self.overwritten + self.restored + self.marked_synced + self.destroyed
    }
}

// ============================================================================
// ILocalStore
// ============================================================================

/// Port for the local persisted snapshot of all collections
#[async_trait::async_trait]
pub trait ILocalStore: Send + Sync {
    // --- sync-engine operations ---

    /// Current pull cursor of a collection (`None` for a full resync)
    async fn load_token(&self, collection: Collection) -> anyhow::Result<Option<SyncToken>>;

    /// Rows carrying a mutation the server has not acknowledged
    async fn pending(&self, collection: Collection) -> anyhow::Result<Vec<StoredRecord>>;

    /// Rows for the given ids in any status, including hidden ones
    async fn find_by_ids(
        &self,
        collection: Collection,
        ids: &[RecordId],
    ) -> anyhow::Result<Vec<StoredRecord>>;

    /// Commit a change batch atomically
    async fn apply(&self, collection: Collection, batch: ChangeBatch)
        -> anyhow::Result<ApplyStats>;

    /// Physically remove soft-deleted rows hidden before `before`
    async fn purge_deleted(
        &self,
        collection: Collection,
        before: DateTime<Utc>,
    ) -> anyhow::Result<u64>;

    // --- read facade ---

    async fn get(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> anyhow::Result<Option<StoredRecord>>;

    async fn get_many(
        &self,
        collection: Collection,
        ids: &[RecordId],
    ) -> anyhow::Result<Vec<StoredRecord>>;

    async fn list(&self, collection: Collection) -> anyhow::Result<Vec<StoredRecord>>;

    // --- local mutations ---

    /// Create or modify a row on behalf of the user
    ///
    /// New rows become pending-create, pending-create rows stay so, and
    /// every other row becomes pending-update.
    async fn save_local(
        &self,
        collection: Collection,
        id: &RecordId,
        data: Value,
        now: DateTime<Utc>,
    ) -> anyhow::Result<StoredRecord>;

    /// Delete a row on behalf of the user
    ///
    /// A pending-create row is removed outright; any other row becomes
    /// pending-delete. Returns false when no live row exists.
    async fn delete_local(
        &self,
        collection: Collection,
        id: &RecordId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    /// Revive a pending-delete or soft-deleted row as pending-update
    ///
    /// Returns false when there is nothing to undo.
    async fn undo_delete(
        &self,
        collection: Collection,
        id: &RecordId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    // --- maintenance ---

    /// Row counts per lifecycle status
    async fn status_counts(
        &self,
        collection: Collection,
    ) -> anyhow::Result<HashMap<RecordStatus, u64>>;

    /// Delete every row and cursor of every collection
    async fn wipe_all(&self) -> anyhow::Result<()>;
}
