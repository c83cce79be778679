//! Cadence Cache - Local snapshot persistence
//!
//! SQLite-based storage for:
//! - Record rows of every synchronized collection, with lifecycle status
//! - Per-collection pull cursors
//!
//! ## Architecture
//!
//! This crate implements the `ILocalStore` port from `cadence-core` using
//! SQLite as the storage backend. It is a driven (secondary) adapter in the
//! hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteLocalStore`] - Full `ILocalStore` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use cadence_cache::{DatabasePool, SqliteLocalStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::open_in(Path::new("/home/user/.local/share/cadence")).await?;
//! let store = SqliteLocalStore::new(pool.pool().clone());
//! // Use store as ILocalStore...
//! # Ok(())
//! # }
//! ```

pub mod local_store;
pub mod pool;

pub use local_store::SqliteLocalStore;
pub use pool::{database_file_name, purge_legacy_databases, DatabasePool, SCHEMA_VERSION};

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Stored data could not be converted to domain types
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Database files could not be listed or removed
    #[error("File system error: {0}")]
    FileSystem(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
