//! Database connection pool management
//!
//! Provides a wrapper around SQLx's SqlitePool with:
//! - Automatic directory creation for database files
//! - WAL journal mode for concurrent reads
//! - Automatic schema migration on first connection
//! - In-memory mode for testing
//!
//! The database file name carries the schema version. Files left behind by
//! other versions are never opened and can be removed with
//! [`purge_legacy_databases`].

use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::CacheError;

/// Version of the local schema, embedded in the database file name
pub const SCHEMA_VERSION: u32 = 1;

const FILE_PREFIX: &str = "cadence-v";

/// File name of the database for the current schema version
pub fn database_file_name() -> String {
    format!("{FILE_PREFIX}{SCHEMA_VERSION}.db")
}

/// Manages a pool of SQLite connections for the local snapshot
///
/// The pool is configured with:
/// - WAL journal mode for concurrent read access
/// - 5 max connections for file-based databases
/// - 1 connection for in-memory databases (required for data persistence)
/// - 5-second busy timeout to handle write contention
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens the current-version database inside `data_dir`
    pub async fn open_in(data_dir: &Path) -> Result<Self, CacheError> {
        Self::new(&data_dir.join(database_file_name())).await
    }

    /// Creates a new database pool connected to the specified file
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the connection cannot be established,
    /// or `CacheError::MigrationFailed` if schema migrations fail.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to connect to database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::info!(
            path = %db_path.display(),
            schema_version = SCHEMA_VERSION,
            "Database pool initialized"
        );

        Ok(Self { pool })
    }

    /// Creates an in-memory database pool for testing
    ///
    /// Uses a single connection because SQLite in-memory databases are
    /// per-connection.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Failed to create in-memory database: {}", e))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::debug!("In-memory database pool initialized");

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes every connection, waiting for checked-out ones to return
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), CacheError> {
        let migration_sql = include_str!("migrations/0001_initial.sql");
        sqlx::raw_sql(migration_sql)
            .execute(pool)
            .await
            .map_err(|e| {
                CacheError::MigrationFailed(format!("Failed to run initial migration: {}", e))
            })?;

        tracing::debug!("Database migrations completed");
        Ok(())
    }
}

/// Removes database files written by other schema versions
///
/// Matches `cadence-v*.db` in `data_dir` together with its `-wal` and
/// `-shm` companions. The current version's files are kept. Returns the
/// removed paths.
pub fn purge_legacy_databases(data_dir: &Path) -> Result<Vec<PathBuf>, CacheError> {
    let current = database_file_name();
    let pattern = data_dir.join(format!("{FILE_PREFIX}*.db*"));
    let pattern = pattern.to_string_lossy();

    let entries = glob::glob(&pattern)
        .map_err(|e| CacheError::FileSystem(format!("Invalid pattern {}: {}", pattern, e)))?;

    let mut removed = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| CacheError::FileSystem(e.to_string()))?;
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_database_file(name) || name.starts_with(&current) {
            continue;
        }

        std::fs::remove_file(&path).map_err(|e| {
            CacheError::FileSystem(format!("Failed to remove {}: {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), "Removed legacy database file");
        removed.push(path);
    }

    Ok(removed)
}

/// `cadence-v<digits>.db`, optionally followed by `-wal` or `-shm`
fn is_database_file(name: &str) -> bool {
    let Some(rest) = name.strip_prefix(FILE_PREFIX) else {
        return false;
    };
    let stem = rest
        .strip_suffix(".db")
        .or_else(|| rest.strip_suffix(".db-wal"))
        .or_else(|| rest.strip_suffix(".db-shm"));
    matches!(stem, Some(v) if !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()))
}
