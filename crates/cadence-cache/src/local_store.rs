//! SQLite implementation of ILocalStore
//!
//! All collections share one `records` table keyed by `(collection, id)`.
//! Record bodies are stored as JSON text so the adapter stays independent
//! of the concrete record types.
//!
//! ## Type Mapping
//!
//! | Domain Type    | SQL Type | Strategy                                   |
//! |----------------|----------|--------------------------------------------|
//! | Collection     | TEXT     | `as_str()` / `FromStr`                     |
//! | RecordId       | TEXT     | `as_str()` / `RecordId::new()`             |
//! | RecordStatus   | TEXT     | `as_str()` / `FromStr`                     |
//! | DateTime<Utc>  | TEXT     | RFC 3339, UTC, microseconds, `Z` suffix    |
//! | record body    | TEXT     | serde_json serialization                   |
//! | SyncToken      | INTEGER  | seconds since the epoch                    |
//!
//! ## Row visibility
//!
//! A row is *live* when its status is not `deleted` and `deleted_at` is
//! unset. Pending-delete rows keep their data until the server
//! acknowledges the deletion; soft-deleted rows are synced rows with
//! `deleted_at` set, waiting for [`ILocalStore::purge_deleted`].

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use cadence_core::domain::{Collection, RecordId, RecordStatus, RecordVersion, StoredRecord, SyncToken};
use cadence_core::ports::{ApplyStats, ChangeBatch, DestroyMode, ILocalStore, Overwrite};

use crate::CacheError;

/// SQLite bound-parameter budget per `IN (...)` query
const MAX_IDS_PER_QUERY: usize = 500;

/// SQLite-based implementation of the local store port
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Format a timestamp so that lexical order equals chronological order
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn serialize_data(data: &Value) -> Result<String, CacheError> {
    serde_json::to_string(data)
        .map_err(|e| CacheError::SerializationError(format!("Failed to serialize record: {}", e)))
}

/// Reconstruct a StoredRecord from a database row
fn stored_record_from_row(row: &SqliteRow) -> Result<StoredRecord, CacheError> {
    let id_str: String = row.try_get("id")?;
    let data_str: String = row.try_get("data")?;
    let status_str: String = row.try_get("status")?;
    let created_at_str: String = row.try_get("created_at")?;
    let updated_at_str: String = row.try_get("updated_at")?;
    let deleted_at_str: Option<String> = row.try_get("deleted_at")?;
    let revision: i64 = row.try_get("revision")?;

    let id = RecordId::new(id_str)
        .map_err(|e| CacheError::SerializationError(format!("Invalid record id: {}", e)))?;
    let data: Value = serde_json::from_str(&data_str)
        .map_err(|e| CacheError::SerializationError(format!("Invalid record JSON: {}", e)))?;
    let status: RecordStatus = status_str
        .parse()
        .map_err(|e| CacheError::SerializationError(format!("{}", e)))?;

    Ok(StoredRecord {
        id,
        data,
        status,
        created_at: parse_datetime(&created_at_str)?,
        updated_at: parse_datetime(&updated_at_str)?,
        deleted_at: parse_optional_datetime(deleted_at_str)?,
        revision,
    })
}

fn records_from_rows(rows: &[SqliteRow]) -> Result<Vec<StoredRecord>, CacheError> {
    rows.iter().map(stored_record_from_row).collect()
}

// ============================================================================
// Queries shared by the pool and transactions
// ============================================================================

async fn fetch_one_any(
    conn: &mut SqliteConnection,
    collection: Collection,
    id: &RecordId,
) -> Result<Option<StoredRecord>, CacheError> {
    let row = sqlx::query(
        "SELECT id, data, status, created_at, updated_at, deleted_at, revision \
         FROM records WHERE collection = ? AND id = ?",
    )
    .bind(collection.as_str())
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;

    row.as_ref().map(stored_record_from_row).transpose()
}

/// Fetch rows by id in chunks, optionally restricted to live rows
async fn fetch_by_ids(
    pool: &SqlitePool,
    collection: Collection,
    ids: &[RecordId],
    live_only: bool,
) -> Result<Vec<StoredRecord>, CacheError> {
    let mut records = Vec::with_capacity(ids.len());

    for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, data, status, created_at, updated_at, deleted_at, revision \
             FROM records WHERE collection = ",
        );
        qb.push_bind(collection.as_str().to_string());
        if live_only {
            qb.push(" AND status != 'deleted' AND deleted_at IS NULL");
        }
        qb.push(" AND id IN (");
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(id.as_str().to_string());
        }
        separated.push_unseparated(")");

        let rows = qb.build().fetch_all(pool).await?;
        records.extend(records_from_rows(&rows)?);
    }

    Ok(records)
}

/// Replace a row with the server's view while it is still at the expected revision
async fn overwrite_row(
    conn: &mut SqliteConnection,
    collection: Collection,
    overwrite: &Overwrite,
) -> Result<bool, CacheError> {
    let result = sqlx::query(
        "UPDATE records SET data = ?, status = 'synced', created_at = ?, \
         updated_at = ?, deleted_at = NULL, revision = revision + 1 \
         WHERE collection = ? AND id = ? AND revision = ?",
    )
    .bind(serialize_data(&overwrite.data)?)
    .bind(format_datetime(&overwrite.created_at))
    .bind(format_datetime(&overwrite.updated_at))
    .bind(collection.as_str())
    .bind(overwrite.expected.id.as_str())
    .bind(overwrite.expected.revision)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn destroy_row(
    conn: &mut SqliteConnection,
    collection: Collection,
    id: &RecordId,
    expected_revision: Option<i64>,
    mode: DestroyMode,
) -> Result<bool, CacheError> {
    let result = match mode {
        DestroyMode::Purge => {
            sqlx::query(
                "DELETE FROM records WHERE collection = ? AND id = ? \
                 AND (? IS NULL OR revision = ?)",
            )
            .bind(collection.as_str())
            .bind(id.as_str())
            .bind(expected_revision)
            .bind(expected_revision)
            .execute(conn)
            .await?
        }
        DestroyMode::SoftDelete { at } => {
            sqlx::query(
                "UPDATE records SET status = 'synced', deleted_at = COALESCE(deleted_at, ?), \
                 revision = revision + 1 \
                 WHERE collection = ? AND id = ? AND (? IS NULL OR revision = ?)",
            )
            .bind(format_datetime(&at))
            .bind(collection.as_str())
            .bind(id.as_str())
            .bind(expected_revision)
            .bind(expected_revision)
            .execute(conn)
            .await?
        }
    };
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// ILocalStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalStore for SqliteLocalStore {
    // --- sync-engine operations ---

    async fn load_token(&self, collection: Collection) -> anyhow::Result<Option<SyncToken>> {
        let token: Option<i64> =
            sqlx::query_scalar("SELECT token FROM sync_tokens WHERE collection = ?")
                .bind(collection.as_str())
                .fetch_optional(&self.pool)
                .await?;

        match token {
            Some(secs) => Ok(Some(SyncToken::new(secs)?)),
            None => Ok(None),
        }
    }

    async fn pending(&self, collection: Collection) -> anyhow::Result<Vec<StoredRecord>> {
        let rows = sqlx::query(
            "SELECT id, data, status, created_at, updated_at, deleted_at, revision \
             FROM records WHERE collection = ? AND status != 'synced' \
             ORDER BY updated_at ASC, id ASC",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(records_from_rows(&rows)?)
    }

    async fn find_by_ids(
        &self,
        collection: Collection,
        ids: &[RecordId],
    ) -> anyhow::Result<Vec<StoredRecord>> {
        Ok(fetch_by_ids(&self.pool, collection, ids, false).await?)
    }

    async fn apply(
        &self,
        collection: Collection,
        batch: ChangeBatch,
    ) -> anyhow::Result<ApplyStats> {
        let mut stats = ApplyStats::default();
        if batch.is_empty() {
            return Ok(stats);
        }

        let mut tx = self.pool.begin().await?;

        for record in &batch.creates {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO records \
                 (collection, id, data, status, created_at, updated_at, deleted_at, revision) \
                 VALUES (?, ?, ?, 'synced', ?, ?, NULL, 1)",
            )
            .bind(collection.as_str())
            .bind(record.id.as_str())
            .bind(serialize_data(&record.data)?)
            .bind(format_datetime(&record.created_at))
            .bind(format_datetime(&record.updated_at))
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                stats.created += 1;
            } else {
                stats.skipped += 1;
            }
        }

        for overwrite in &batch.overwrites {
            if overwrite_row(&mut *tx, collection, overwrite).await? {
                stats.overwritten += 1;
            } else {
                stats.skipped += 1;
            }
        }

        for restore in &batch.restores {
            if overwrite_row(&mut *tx, collection, restore).await? {
                stats.restored += 1;
            } else {
                stats.skipped += 1;
            }
        }

        for version in &batch.mark_synced {
            let result = sqlx::query(
                "UPDATE records SET status = 'synced', revision = revision + 1 \
                 WHERE collection = ? AND id = ? AND revision = ?",
            )
            .bind(collection.as_str())
            .bind(version.id.as_str())
            .bind(version.revision)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                stats.marked_synced += 1;
            } else {
                stats.skipped += 1;
            }
        }

        for id in &batch.destroys {
            if destroy_row(&mut *tx, collection, id, None, batch.destroy_mode).await? {
                stats.destroyed += 1;
            }
        }

        for RecordVersion { id, revision } in &batch.guarded_destroys {
            if destroy_row(&mut *tx, collection, id, Some(*revision), batch.destroy_mode).await? {
                stats.destroyed += 1;
            } else {
                stats.skipped += 1;
            }
        }

        if let Some(token) = batch.token {
            sqlx::query(
                "INSERT INTO sync_tokens (collection, token) VALUES (?, ?) \
                 ON CONFLICT(collection) DO UPDATE SET token = MAX(token, excluded.token)",
            )
            .bind(collection.as_str())
            .bind(token.as_secs())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            collection = %collection,
            created = stats.created,
            overwritten = stats.overwritten,
            restored = stats.restored,
            marked_synced = stats.marked_synced,
            destroyed = stats.destroyed,
            skipped = stats.skipped,
            token = ?batch.token.map(|t| t.as_secs()),
            "Applied change batch"
        );

        Ok(stats)
    }

    async fn purge_deleted(
        &self,
        collection: Collection,
        before: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM records WHERE collection = ? AND status = 'synced' \
             AND deleted_at IS NOT NULL AND deleted_at < ?",
        )
        .bind(collection.as_str())
        .bind(format_datetime(&before))
        .execute(&self.pool)
        .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            tracing::debug!(collection = %collection, purged, "Purged soft-deleted records");
        }
        Ok(purged)
    }

    // --- read facade ---

    async fn get(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> anyhow::Result<Option<StoredRecord>> {
        let row = sqlx::query(
            "SELECT id, data, status, created_at, updated_at, deleted_at, revision \
             FROM records WHERE collection = ? AND id = ? \
             AND status != 'deleted' AND deleted_at IS NULL",
        )
        .bind(collection.as_str())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(stored_record_from_row).transpose()?)
    }

    async fn get_many(
        &self,
        collection: Collection,
        ids: &[RecordId],
    ) -> anyhow::Result<Vec<StoredRecord>> {
        Ok(fetch_by_ids(&self.pool, collection, ids, true).await?)
    }

    async fn list(&self, collection: Collection) -> anyhow::Result<Vec<StoredRecord>> {
        let rows = sqlx::query(
            "SELECT id, data, status, created_at, updated_at, deleted_at, revision \
             FROM records WHERE collection = ? \
             AND status != 'deleted' AND deleted_at IS NULL \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(records_from_rows(&rows)?)
    }

    // --- local mutations ---

    async fn save_local(
        &self,
        collection: Collection,
        id: &RecordId,
        data: Value,
        now: DateTime<Utc>,
    ) -> anyhow::Result<StoredRecord> {
        let data = serialize_data(&data)?;
        let now_str = format_datetime(&now);

        let mut tx = self.pool.begin().await?;

        match fetch_one_any(&mut *tx, collection, id).await? {
            None => {
                sqlx::query(
                    "INSERT INTO records \
                     (collection, id, data, status, created_at, updated_at, deleted_at, revision) \
                     VALUES (?, ?, ?, 'created', ?, ?, NULL, 1)",
                )
                .bind(collection.as_str())
                .bind(id.as_str())
                .bind(&data)
                .bind(&now_str)
                .bind(&now_str)
                .execute(&mut *tx)
                .await?;
            }
            Some(existing) => {
                let still_unsent =
                    existing.status == RecordStatus::Created && existing.deleted_at.is_none();
                let status = if still_unsent {
                    RecordStatus::Created
                } else {
                    RecordStatus::Updated
                };

                sqlx::query(
                    "UPDATE records SET data = ?, status = ?, updated_at = ?, \
                     deleted_at = NULL, revision = revision + 1 \
                     WHERE collection = ? AND id = ?",
                )
                .bind(&data)
                .bind(status.as_str())
                .bind(&now_str)
                .bind(collection.as_str())
                .bind(id.as_str())
                .execute(&mut *tx)
                .await?;
            }
        }

        let saved = fetch_one_any(&mut *tx, collection, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Record {} vanished during save", id))?;
        tx.commit().await?;

        tracing::trace!(
            collection = %collection,
            id = %id,
            status = %saved.status,
            revision = saved.revision,
            "Saved local record"
        );
        Ok(saved)
    }

    async fn delete_local(
        &self,
        collection: Collection,
        id: &RecordId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let existing = match fetch_one_any(&mut *tx, collection, id).await? {
            Some(r) if r.status != RecordStatus::Deleted && r.deleted_at.is_none() => r,
            _ => return Ok(false),
        };

        if existing.status == RecordStatus::Created {
            // Never reached the server, nothing to tell it.
            sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
                .bind(collection.as_str())
                .bind(id.as_str())
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query(
                "UPDATE records SET status = 'deleted', updated_at = ?, revision = revision + 1 \
                 WHERE collection = ? AND id = ?",
            )
            .bind(format_datetime(&now))
            .bind(collection.as_str())
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::trace!(
            collection = %collection,
            id = %id,
            was = %existing.status,
            "Deleted local record"
        );
        Ok(true)
    }

    async fn undo_delete(
        &self,
        collection: Collection,
        id: &RecordId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE records SET status = 'updated', deleted_at = NULL, updated_at = ?, \
             revision = revision + 1 \
             WHERE collection = ? AND id = ? \
             AND (status = 'deleted' OR deleted_at IS NOT NULL)",
        )
        .bind(format_datetime(&now))
        .bind(collection.as_str())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        let undone = result.rows_affected() > 0;
        if undone {
            tracing::trace!(collection = %collection, id = %id, "Undid local delete");
        }
        Ok(undone)
    }

    // --- maintenance ---

    async fn status_counts(
        &self,
        collection: Collection,
    ) -> anyhow::Result<HashMap<RecordStatus, u64>> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM records \
             WHERE collection = ? AND (status != 'synced' OR deleted_at IS NULL) \
             GROUP BY status",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for row in &rows {
            let status_str: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            let status: RecordStatus = status_str.parse()?;
            counts.insert(status, count as u64);
        }

        Ok(counts)
    }

    async fn wipe_all(&self) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM records").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM sync_tokens")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("Wiped local store");
        Ok(())
    }
}
