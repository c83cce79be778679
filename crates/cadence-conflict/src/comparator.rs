//! Last-writer-wins comparators
//!
//! A comparator decides which side of a non-tombstone conflict keeps its
//! whole record. It never merges fields.

use std::fmt;

use cadence_core::domain::{LocalRecord, SyncEntry, Syncable};

/// The side whose record survives a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Server,
    Local,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Server => f.write_str("server"),
            Winner::Local => f.write_str("local"),
        }
    }
}

/// Per-collection conflict policy
pub trait Comparator<T>: Send + Sync {
    fn compare(&self, server: &SyncEntry<T>, local: &LocalRecord<T>) -> Winner;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Most recent `updated_at` wins; ties go to the server
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdatedAtComparator;

impl<T> Comparator<T> for UpdatedAtComparator {
    fn compare(&self, server: &SyncEntry<T>, local: &LocalRecord<T>) -> Winner {
        if server.updated_at() >= local.updated_at {
            Winner::Server
        } else {
            Winner::Local
        }
    }

    fn name(&self) -> &'static str {
        "updated_at"
    }
}

/// Higher progress wins, so clock skew cannot make visible progress regress
///
/// Falls back to [`UpdatedAtComparator`] when progress is equal or either
/// side reports none.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxProgressComparator;

impl<T: Syncable> Comparator<T> for MaxProgressComparator {
    fn compare(&self, server: &SyncEntry<T>, local: &LocalRecord<T>) -> Winner {
        let server_progress = server.record.as_ref().and_then(|r| r.progress());
        let local_progress = local.record.progress();

        match (server_progress, local_progress) {
            (Some(s), Some(l)) if s > l => Winner::Server,
            (Some(s), Some(l)) if s < l => Winner::Local,
            _ => UpdatedAtComparator.compare(server, local),
        }
    }

    fn name(&self) -> &'static str {
        "max_progress"
    }
}
