//! Error types for the conflict crate

use thiserror::Error;

/// Errors raised while building resolution policy from configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConflictError {
    /// Comparator name not recognized
    #[error("Invalid comparator '{name}' for {collection}")]
    InvalidComparator { collection: String, name: String },
}
