//! Wire-level sync entries and push/pull payloads
//!
//! These types describe what the remote store sends and receives. Record
//! bodies default to raw `serde_json::Value` at the protocol boundary and
//! are decoded into typed records by the sync store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::newtypes::{RecordId, SyncToken};

/// `failure_type` reported by the server for field-validation rejections
pub const FAILURE_TYPE_INVALID: &str = "invalid";

// ============================================================================
// SyncEntry
// ============================================================================

/// Server-side lifecycle timestamps of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
    /// Set when the record is a tombstone
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Identifiers carried alongside an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryIds {
    pub id: RecordId,
}

/// Entry metadata: identifiers plus lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub ids: EntryIds,
    pub lifecycle: Lifecycle,
}

/// One record as seen by the server
///
/// A tombstone (`deleted_at` set) may omit its record body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEntry<T = Value> {
    pub record: Option<T>,
    pub meta: EntryMeta,
}

impl<T> SyncEntry<T> {
    /// Identifier of the record this entry describes
    pub fn id(&self) -> &RecordId {
        &self.meta.ids.id
    }

    /// Whether this entry signals a deletion
    pub fn is_tombstone(&self) -> bool {
        self.meta.lifecycle.deleted_at.is_some()
    }

    /// Server-side modification time
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.meta.lifecycle.updated_at
    }
}

impl SyncEntry<Value> {
    /// Decode the raw record body into a typed record
    ///
    /// Tombstones decode leniently: a body that does not match `T` is
    /// dropped instead of failing, since only the id and lifecycle matter.
    ///
    /// # Errors
    /// Returns the serde error when a live entry's body does not match `T`,
    /// or when a live entry carries no body at all.
    pub fn decode<T: DeserializeOwned>(self) -> Result<SyncEntry<T>, serde_json::Error> {
        let tombstone = self.is_tombstone();
        let record = match self.record {
            None | Some(Value::Null) if tombstone => None,
            None | Some(Value::Null) => {
                return Err(serde::de::Error::custom(format!(
                    "entry {} has no record body",
                    self.meta.ids.id
                )))
            }
            Some(value) if tombstone => serde_json::from_value(value).ok(),
            Some(value) => Some(serde_json::from_value(value)?),
        };
        Ok(SyncEntry {
            record,
            meta: self.meta,
        })
    }
}

// ============================================================================
// Pull
// ============================================================================

/// Cursor metadata returned with every pull
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullMeta {
    /// The token the request was made with, echoed back
    #[serde(default)]
    pub since: Option<SyncToken>,
    /// Highest modification stamp among the returned entries
    #[serde(default)]
    pub max_stamp: Option<SyncToken>,
    /// Server time at which the response was produced
    pub timestamp: SyncToken,
}

impl PullMeta {
    /// The token to store after this pull has been applied
    pub fn next_token(&self) -> SyncToken {
        self.max_stamp.unwrap_or(self.timestamp)
    }
}

/// Normalized pull response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse<T = Value> {
    pub entries: Vec<SyncEntry<T>>,
    pub meta: PullMeta,
}

// ============================================================================
// Push
// ============================================================================

/// Metadata of one pushed record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEntryMeta {
    pub ids: EntryIds,
    /// True when the local mutation is a deletion
    pub deleted: bool,
}

/// One locally pending record submitted to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEntry<T = Value> {
    pub record: T,
    pub meta: PushEntryMeta,
}

impl<T> PushEntry<T> {
    pub fn id(&self) -> &RecordId {
        &self.meta.ids.id
    }
}

/// Body of a push request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayload<T = Value> {
    pub entries: Vec<PushEntry<T>>,
}

/// Per-record acknowledgement of a push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushResult<T = Value> {
    /// The server accepted the mutation and returns its current view
    Success { entry: SyncEntry<T> },
    /// The server refused the mutation
    Failure {
        failure_type: String,
        ids: EntryIds,
        /// Field name to validation messages
        #[serde(default)]
        errors: Option<HashMap<String, Vec<String>>>,
    },
}

impl<T> PushResult<T> {
    /// Identifier of the record this result acknowledges
    pub fn id(&self) -> &RecordId {
        match self {
            PushResult::Success { entry } => entry.id(),
            PushResult::Failure { ids, .. } => &ids.id,
        }
    }
}

/// Normalized push response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushResponse<T = Value> {
    pub results: Vec<PushResult<T>>,
}
