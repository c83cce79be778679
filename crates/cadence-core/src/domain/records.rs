//! Record models for each synchronized collection

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::collection::Collection;
use super::newtypes::RecordId;
use super::record::Syncable;

/// A liked piece of content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentLike {
    pub content_id: u64,
}

impl Syncable for ContentLike {
    const COLLECTION: Collection = Collection::ContentLikes;

    fn record_id(&self) -> RecordId {
        RecordId::from(self.content_id)
    }
}

// ============================================================================
// Content progress
// ============================================================================

/// Whether a piece of content has been started or finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    Started,
    Completed,
}

/// How far the user has got through a piece of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentProgress {
    pub content_id: u64,
    pub state: ProgressState,
    /// 0 to 100
    pub progress_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_time_seconds: Option<u32>,
}

impl Syncable for ContentProgress {
    const COLLECTION: Collection = Collection::ContentProgress;

    fn record_id(&self) -> RecordId {
        RecordId::from(self.content_id)
    }

    fn progress(&self) -> Option<f64> {
        Some(f64::from(self.progress_percent))
    }
}

// ============================================================================
// Practices
// ============================================================================

/// One logged practice session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Practice {
    /// Client-generated identifier
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub day: NaiveDate,
    pub duration_seconds: u32,
}

impl Practice {
    /// A new practice entry with a fresh v4 identifier
    pub fn new(day: NaiveDate, duration_seconds: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_id: None,
            title: None,
            day,
            duration_seconds,
        }
    }
}

impl Syncable for Practice {
    const COLLECTION: Collection = Collection::Practices;

    fn record_id(&self) -> RecordId {
        RecordId::from(self.id)
    }
}

// ============================================================================
// Notes
// ============================================================================

/// A free-text note attached to a piece of content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub content_id: u64,
    pub value: String,
}

impl Syncable for Note {
    const COLLECTION: Collection = Collection::Notes;

    fn record_id(&self) -> RecordId {
        RecordId::from(self.content_id)
    }
}

// ============================================================================
// Award progress
// ============================================================================

/// Progress towards earning an award
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAwardProgress {
    pub award_id: RecordId,
    /// 0 to 100
    pub progress_percentage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Opaque award-specific state owned by the awards business rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_data: Option<serde_json::Value>,
}

impl Syncable for UserAwardProgress {
    const COLLECTION: Collection = Collection::AwardProgress;

    fn record_id(&self) -> RecordId {
        self.award_id.clone()
    }

    fn progress(&self) -> Option<f64> {
        Some(f64::from(self.progress_percentage))
    }
}
