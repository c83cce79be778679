//! SyncResolver - decides what a pulled server entry does to local state
//!
//! Every decision follows from three facts: whether a local record exists,
//! whether the server entry is a tombstone, and which pending mutation (if
//! any) the local record carries. When both sides hold a live change the
//! collection's [`Comparator`] picks the winner.
//!
//! | Local status   | Tombstone | Live entry                                   |
//! |----------------|-----------|----------------------------------------------|
//! | absent         | skip      | create                                       |
//! | synced         | destroy   | server wins: update; local wins: skip        |
//! | pending-create | destroy   | server wins: update; local wins: mark synced |
//! | pending-update | destroy   | server wins: update; local wins: mark synced |
//! | pending-delete | destroy   | server newer or equal: restore; else destroy |

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, trace};

use cadence_core::domain::{LocalRecord, RecordId, RecordStatus, SyncEntry, SyncResolution, Syncable};

use crate::comparator::{Comparator, Winner};

/// Outcome of resolving one server entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedAction {
    /// Insert the server record locally
    Create,
    /// Replace the local record with the server's
    Update,
    /// Cancel a local deletion and take the server's record
    Restore,
    /// Remove the local record
    Destroy,
    /// Keep local data and clear its pending status
    MarkSynced,
    /// Leave local state untouched
    Skip,
}

impl fmt::Display for ResolvedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolvedAction::Create => "create",
            ResolvedAction::Update => "update",
            ResolvedAction::Restore => "restore",
            ResolvedAction::Destroy => "destroy",
            ResolvedAction::MarkSynced => "mark_synced",
            ResolvedAction::Skip => "skip",
        };
        f.write_str(s)
    }
}

/// Resolves pulled entries of one collection against local records
pub struct SyncResolver<'a, T> {
    comparator: &'a dyn Comparator<T>,
}

impl<'a, T: Syncable> SyncResolver<'a, T> {
    pub fn new(comparator: &'a dyn Comparator<T>) -> Self {
        Self { comparator }
    }

    /// Decide the action for one server entry
    ///
    /// `local` is the local record with the same id, if any.
    pub fn resolve(&self, entry: &SyncEntry<T>, local: Option<&LocalRecord<T>>) -> ResolvedAction {
        let action = match local {
            None => Self::against_none(entry),
            Some(local) => match local.status {
                RecordStatus::Synced => self.against_synced(entry, local),
                RecordStatus::Created => self.against_created(entry, local),
                RecordStatus::Updated => self.against_updated(entry, local),
                RecordStatus::Deleted => Self::against_deleted(entry, local),
            },
        };

        trace!(
            collection = %T::COLLECTION,
            id = %entry.id(),
            tombstone = entry.is_tombstone(),
            local_status = local.map(|l| l.status.as_str()).unwrap_or("absent"),
            action = %action,
            "Resolved server entry"
        );
        action
    }

    fn against_none(entry: &SyncEntry<T>) -> ResolvedAction {
        if entry.is_tombstone() {
            ResolvedAction::Skip
        } else {
            ResolvedAction::Create
        }
    }

    fn against_synced(&self, entry: &SyncEntry<T>, local: &LocalRecord<T>) -> ResolvedAction {
        if entry.is_tombstone() {
            return ResolvedAction::Destroy;
        }
        match self.comparator.compare(entry, local) {
            Winner::Server => ResolvedAction::Update,
            // A newer local write already landed after this pull was issued.
            Winner::Local => ResolvedAction::Skip,
        }
    }

    fn against_created(&self, entry: &SyncEntry<T>, local: &LocalRecord<T>) -> ResolvedAction {
        if entry.is_tombstone() {
            return ResolvedAction::Destroy;
        }
        match self.comparator.compare(entry, local) {
            Winner::Server => ResolvedAction::Update,
            Winner::Local => ResolvedAction::MarkSynced,
        }
    }

    fn against_updated(&self, entry: &SyncEntry<T>, local: &LocalRecord<T>) -> ResolvedAction {
        self.against_created(entry, local)
    }

    fn against_deleted(entry: &SyncEntry<T>, local: &LocalRecord<T>) -> ResolvedAction {
        if entry.is_tombstone() {
            return ResolvedAction::Destroy;
        }
        if entry.updated_at() >= local.updated_at {
            ResolvedAction::Restore
        } else {
            ResolvedAction::Destroy
        }
    }

    /// Resolve a whole pull response into one [`SyncResolution`]
    ///
    /// When the response carries the same id more than once, only the
    /// entry with the latest `updated_at` is resolved (the later one on a
    /// tie), so every id lands in at most one bucket.
    pub fn resolve_batch(
        &self,
        entries: Vec<SyncEntry<T>>,
        mut locals: HashMap<RecordId, LocalRecord<T>>,
    ) -> SyncResolution<T> {
        let mut resolution = SyncResolution::default();

        for entry in dedupe_latest(entries) {
            let local = locals.remove(entry.id());
            match self.resolve(&entry, local.as_ref()) {
                ResolvedAction::Create => resolution.entries_for_create.push(entry),
                ResolvedAction::Update => {
                    if let Some(local) = local {
                        resolution.tuples_for_update.push((local, entry));
                    }
                }
                ResolvedAction::Restore => {
                    if let Some(local) = local {
                        resolution.tuples_for_restore.push((local, entry));
                    }
                }
                ResolvedAction::Destroy => resolution.ids_for_destroy.push(entry.meta.ids.id),
                ResolvedAction::MarkSynced => {
                    if let Some(local) = local {
                        resolution.records_for_synced.push(local);
                    }
                }
                ResolvedAction::Skip => {}
            }
        }

        debug!(
            collection = %T::COLLECTION,
            comparator = self.comparator.name(),
            create = resolution.entries_for_create.len(),
            update = resolution.tuples_for_update.len(),
            restore = resolution.tuples_for_restore.len(),
            destroy = resolution.ids_for_destroy.len(),
            mark_synced = resolution.records_for_synced.len(),
            "Resolved pull batch"
        );

        resolution
    }
}

/// Keep one entry per id, preferring the latest `updated_at`
///
/// Preserves the position of each id's first appearance.
fn dedupe_latest<T>(entries: Vec<SyncEntry<T>>) -> Vec<SyncEntry<T>> {
    let mut positions: HashMap<RecordId, usize> = HashMap::new();
    let mut kept: Vec<SyncEntry<T>> = Vec::with_capacity(entries.len());

    for entry in entries {
        match positions.get(entry.id()) {
            Some(&idx) => {
                if entry.updated_at() >= kept[idx].updated_at() {
                    kept[idx] = entry;
                }
            }
            None => {
                positions.insert(entry.id().clone(), kept.len());
                kept.push(entry);
            }
        }
    }
    kept
}
