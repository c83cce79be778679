//! Typed read facade over the local snapshot
//!
//! Business code reads and mutates records through a [`Repository`]; it
//! never sees hidden rows (pending deletions and soft-deleted rows) and
//! never talks to the network. Mutations become pending and are picked up
//! by the next sync cycle.

use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use cadence_core::domain::{LocalRecord, RecordId, StoredRecord, Syncable};
use cadence_core::ports::ILocalStore;

/// Local records of the collection `T` belongs to
pub struct Repository<T> {
    local: Arc<dyn ILocalStore>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            local: Arc::clone(&self.local),
            _record: PhantomData,
        }
    }
}

impl<T: Syncable> Repository<T> {
    pub fn new(local: Arc<dyn ILocalStore>) -> Self {
        Self {
            local,
            _record: PhantomData,
        }
    }

    pub async fn get_one_by(&self, id: &RecordId) -> anyhow::Result<Option<LocalRecord<T>>> {
        self.local
            .get(T::COLLECTION, id)
            .await?
            .map(decode::<T>)
            .transpose()
    }

    /// Records for the ids that exist, in no particular order
    pub async fn get_many_by(&self, ids: &[RecordId]) -> anyhow::Result<Vec<LocalRecord<T>>> {
        self.local
            .get_many(T::COLLECTION, ids)
            .await?
            .into_iter()
            .map(decode::<T>)
            .collect()
    }

    /// Every visible record matching `predicate`
    pub async fn get_all<P>(&self, predicate: P) -> anyhow::Result<Vec<LocalRecord<T>>>
    where
        P: Fn(&T) -> bool,
    {
        let mut records = Vec::new();
        for row in self.local.list(T::COLLECTION).await? {
            let record = decode(row)?;
            if predicate(&record.record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Create or update a record; it becomes pending until the next push
    pub async fn save(&self, record: &T) -> anyhow::Result<LocalRecord<T>> {
        let data = serde_json::to_value(record)
            .with_context(|| format!("Failed to encode {} record", T::COLLECTION))?;
        let stored = self
            .local
            .save_local(T::COLLECTION, &record.record_id(), data, Utc::now())
            .await?;
        decode(stored)
    }

    /// Returns false when no visible record has this id
    pub async fn delete(&self, id: &RecordId) -> anyhow::Result<bool> {
        self.local.delete_local(T::COLLECTION, id, Utc::now()).await
    }

    /// Revive a deleted record that has not been purged yet
    pub async fn undo_delete(&self, id: &RecordId) -> anyhow::Result<bool> {
        self.local.undo_delete(T::COLLECTION, id, Utc::now()).await
    }
}

fn decode<T: Syncable>(row: StoredRecord) -> anyhow::Result<LocalRecord<T>> {
    let id = row.id.clone();
    row.decode()
        .with_context(|| format!("Stored {} record {} does not decode", T::COLLECTION, id))
}
