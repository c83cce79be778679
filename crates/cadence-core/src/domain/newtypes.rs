//! Newtype wrappers for type-safe domain identifiers
//!
//! - [`RecordId`] - stable identifier of a record within its collection
//! - [`SyncToken`] - per-collection pull cursor in epoch seconds

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// RecordId
// ============================================================================

/// Identifier of a record, unique within one collection
///
/// Servers send numeric ids for content-keyed collections and strings for
/// client-generated ones; both are normalized to their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub struct RecordId(String);

/// Accepted wire shapes for a record id
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(u64),
    Text(String),
}

impl RecordId {
    /// Create a new RecordId
    ///
    /// # Errors
    /// Returns error if the id is empty or only whitespace
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvalidRecordId(
                "Record ID cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<Uuid> for RecordId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match IdRepr::deserialize(deserializer)? {
            IdRepr::Number(n) => Ok(Self::from(n)),
            IdRepr::Text(s) => Self::new(s).map_err(serde::de::Error::custom),
        }
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

// ============================================================================
// SyncToken
// ============================================================================

/// Pull cursor for one collection, in epoch seconds
///
/// The absence of a token (`Option::None`) requests a full resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncToken(i64);

impl SyncToken {
    /// Create a token from epoch seconds
    ///
    /// # Errors
    /// Returns error if `secs` is negative
    pub fn new(secs: i64) -> Result<Self, DomainError> {
        if secs < 0 {
            return Err(DomainError::InvalidSyncToken(secs.to_string()));
        }
        Ok(Self(secs))
    }

    /// Epoch seconds carried by this token
    #[must_use]
    pub fn as_secs(&self) -> i64 {
        self.0
    }

    /// The token as a UTC timestamp
    #[must_use]
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.0, 0).single()
    }

    /// Advance a cursor without ever moving it backwards
    ///
    /// Returns the larger of `previous` and `next`.
    #[must_use]
    pub fn advance(previous: Option<Self>, next: Self) -> Self {
        match previous {
            Some(prev) if prev > next => prev,
            _ => next,
        }
    }
}

impl Display for SyncToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SyncToken {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let secs = s
            .trim()
            .parse::<i64>()
            .map_err(|_| DomainError::InvalidSyncToken(s.to_string()))?;
        Self::new(secs)
    }
}
