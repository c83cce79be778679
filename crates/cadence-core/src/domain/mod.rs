//! Domain types for the sync engine
//!
//! - Newtypes for record identifiers and sync cursors
//! - The closed set of synchronized collections
//! - Wire-level sync entries and push/pull payloads
//! - Local record lifecycle and resolver output
//! - Concrete record models for each collection
//! - Domain-specific error types

pub mod collection;
pub mod entry;
pub mod errors;
pub mod newtypes;
pub mod record;
pub mod records;

pub use collection::Collection;
pub use entry::{
    EntryIds, EntryMeta, Lifecycle, PullMeta, PullResponse, PushEntry, PushEntryMeta,
    PushPayload, PushResponse, PushResult, SyncEntry, FAILURE_TYPE_INVALID,
};
pub use errors::DomainError;
pub use newtypes::{RecordId, SyncToken};
pub use record::{LocalRecord, RecordStatus, RecordVersion, StoredRecord, SyncResolution, Syncable};
pub use records::{ContentLike, ContentProgress, Note, Practice, ProgressState, UserAwardProgress};
