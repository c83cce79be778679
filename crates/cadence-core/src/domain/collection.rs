//! The closed set of synchronized collections

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// One independently synchronized set of records
///
/// The snake_case name doubles as the HTTP path segment, the SQLite
/// `collection` column value, and the metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Content the user has liked
    ContentLikes,
    /// Per-content progress (started / completed, percent, resume point)
    ContentProgress,
    /// Practice log entries
    Practices,
    /// Free-text notes attached to content
    Notes,
    /// Progress towards awards
    AwardProgress,
}

impl Collection {
    /// Every collection, in a stable order
    pub const ALL: [Collection; 5] = [
        Collection::ContentLikes,
        Collection::ContentProgress,
        Collection::Practices,
        Collection::Notes,
        Collection::AwardProgress,
    ];

    /// Returns the wire name of this collection
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::ContentLikes => "content_likes",
            Collection::ContentProgress => "content_progress",
            Collection::Practices => "practices",
            Collection::Notes => "notes",
            Collection::AwardProgress => "award_progress",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| DomainError::UnknownCollection(s.to_string()))
    }
}
