//! Local record lifecycle and resolver output
//!
//! The local persistence layer tracks a [`RecordStatus`] per row. The
//! engine reads it to decide how a pulled server entry interacts with a
//! local record, and writes it back through guarded change batches.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::collection::Collection;
use super::entry::SyncEntry;
use super::errors::DomainError;
use super::newtypes::RecordId;

// ============================================================================
// Syncable
// ============================================================================

/// A record type that belongs to exactly one synchronized collection
pub trait Syncable:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    /// The collection records of this type live in
    const COLLECTION: Collection;

    /// Stable identifier, unique within the collection
    fn record_id(&self) -> RecordId;

    /// Monotonic progress value, for collections whose comparator prefers
    /// the further-along side over the more recent one
    fn progress(&self) -> Option<f64> {
        None
    }
}

// ============================================================================
// RecordStatus
// ============================================================================

/// Local lifecycle status of a record
///
/// At most one pending mutation kind is tracked per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Local copy matches the last known server state
    Synced,
    /// Created locally, never acknowledged by the server
    Created,
    /// Modified locally since the last acknowledgement
    Updated,
    /// Deleted locally, deletion not yet acknowledged
    Deleted,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Synced => "synced",
            RecordStatus::Created => "created",
            RecordStatus::Updated => "updated",
            RecordStatus::Deleted => "deleted",
        }
    }

    /// Whether the record carries a mutation the server has not seen
    pub fn is_pending(&self) -> bool {
        !matches!(self, RecordStatus::Synced)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(RecordStatus::Synced),
            "created" => Ok(RecordStatus::Created),
            "updated" => Ok(RecordStatus::Updated),
            "deleted" => Ok(RecordStatus::Deleted),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// Stored and typed local records
// ============================================================================

/// Version stamp used to guard writes against concurrent local edits
///
/// `revision` increases on every local mutation of the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordVersion {
    pub id: RecordId,
    pub revision: i64,
}

/// A local row as persisted, with an untyped record body
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub data: Value,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set on synced rows that are soft-deleted and awaiting purge
    pub deleted_at: Option<DateTime<Utc>>,
    pub revision: i64,
}

impl StoredRecord {
    pub fn version(&self) -> RecordVersion {
        RecordVersion {
            id: self.id.clone(),
            revision: self.revision,
        }
    }

    /// Decode the body into a typed record
    pub fn decode<T: DeserializeOwned>(self) -> Result<LocalRecord<T>, serde_json::Error> {
        Ok(LocalRecord {
            record: serde_json::from_value(self.data)?,
            id: self.id,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            revision: self.revision,
        })
    }
}

/// A local row with a typed record body
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRecord<T> {
    pub id: RecordId,
    pub record: T,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub revision: i64,
}

impl<T> LocalRecord<T> {
    pub fn version(&self) -> RecordVersion {
        RecordVersion {
            id: self.id.clone(),
            revision: self.revision,
        }
    }
}

// ============================================================================
// SyncResolution
// ============================================================================

/// Output of one resolver pass over one pull response
///
/// The five buckets are disjoint; a record id appears in at most one.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResolution<T> {
    pub entries_for_create: Vec<SyncEntry<T>>,
    pub tuples_for_update: Vec<(LocalRecord<T>, SyncEntry<T>)>,
    pub tuples_for_restore: Vec<(LocalRecord<T>, SyncEntry<T>)>,
    pub ids_for_destroy: Vec<RecordId>,
    pub records_for_synced: Vec<LocalRecord<T>>,
}

impl<T> Default for SyncResolution<T> {
    fn default() -> Self {
        Self {
            entries_for_create: Vec::new(),
            tuples_for_update: Vec::new(),
            tuples_for_restore: Vec::new(),
            ids_for_destroy: Vec::new(),
            records_for_synced: Vec::new(),
        }
    }
}

impl<T> SyncResolution<T> {
    /// Total number of queued actions across all buckets
    pub fn len(&self) -> usize {
        self.entries_for_create.len()
            + self.tuples_for_update.len()
            + self.tuples_for_restore.len()
            + self.ids_for_destroy.len()
            + self.records_for_synced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
