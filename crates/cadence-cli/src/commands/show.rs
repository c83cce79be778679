//! Show command - Print records from the local snapshot
//!
//! Only visible records are listed: pending deletions and soft-deleted
//! rows are hidden, as they are from application code.

use anyhow::{Context, Result};
use cadence_core::domain::{Collection, RecordId, StoredRecord};
use cadence_core::ports::ILocalStore;
use clap::Args;
use serde_json::json;

use super::{open_local, parse_collection, CommandContext};
use crate::output::plural;

#[derive(Debug, Args)]
pub struct ShowCommand {
    /// Collection to read
    #[arg(value_parser = parse_collection)]
    pub collection: Collection,

    /// Record ids; all visible records when omitted
    pub ids: Vec<String>,
}

impl ShowCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config();

        let Some(local) = open_local(&config, false).await? else {
            formatter.error("No local data found. Run 'cadence sync' first.");
            return Ok(());
        };

        let ids = self
            .ids
            .iter()
            .map(|id| id.parse::<RecordId>())
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid record id")?;
        let records = read_records(local.as_ref(), self.collection, &ids).await?;

        if ctx.format.is_json() {
            let records: Vec<_> = records.iter().map(record_json).collect();
            formatter.print_json(&json!({
                "collection": self.collection,
                "records": records,
            }));
            return Ok(());
        }

        formatter.success(&format!(
            "{}: {}",
            self.collection,
            plural(records.len() as u64, "record")
        ));
        for record in &records {
            formatter.info("");
            formatter.field("Id", record.id.as_str());
            formatter.field("Status", record.status.as_str());
            formatter.field("Updated", &record.updated_at.to_rfc3339());
            formatter.field("Data", &record.data.to_string());
        }
        Ok(())
    }
}

async fn read_records(
    local: &dyn ILocalStore,
    collection: Collection,
    ids: &[RecordId],
) -> Result<Vec<StoredRecord>> {
    let mut records = if ids.is_empty() {
        local.list(collection).await
    } else {
        local.get_many(collection, ids).await
    }
    .with_context(|| format!("Failed to read {} records", collection))?;
    records.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(records)
}

fn record_json(record: &StoredRecord) -> serde_json::Value {
    json!({
        "id": record.id,
        "status": record.status,
        "created_at": record.created_at,
        "updated_at": record.updated_at,
        "revision": record.revision,
        "data": record.data,
    })
}
