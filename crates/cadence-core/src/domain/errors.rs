//! Domain error types
//!
//! Validation failures for identifiers, cursors and enum names parsed from
//! configuration, storage or the wire.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Record identifier was empty or malformed
    #[error("Invalid record ID: {0}")]
    InvalidRecordId(String),

    /// Sync cursor could not be parsed or was negative
    #[error("Invalid sync token: {0}")]
    InvalidSyncToken(String),

    /// Name does not match any known collection
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// Stored status string does not match any lifecycle status
    #[error("Unknown record status: {0}")]
    UnknownStatus(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
