//! Status command - Display synchronization status
//!
//! Provides the `cadence status` CLI command which shows, for every
//! enabled collection, how many records are synced, how many local
//! changes wait for a push, and the pull cursor.

use std::collections::HashMap;

use anyhow::{Context, Result};
use cadence_core::domain::{Collection, RecordStatus, SyncToken};
use cadence_core::ports::ILocalStore;
use clap::Args;
use serde_json::json;

use super::{open_local, parse_collection, CommandContext};
use crate::output::plural;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Show only this collection
    #[arg(long, value_parser = parse_collection)]
    pub collection: Option<Collection>,
}

/// Local state of one collection
#[derive(Debug, Clone, PartialEq)]
struct CollectionStatus {
    collection: Collection,
    synced: u64,
    created: u64,
    updated: u64,
    deleted: u64,
    token: Option<SyncToken>,
}

impl CollectionStatus {
    fn from_counts(
        collection: Collection,
        counts: &HashMap<RecordStatus, u64>,
        token: Option<SyncToken>,
    ) -> Self {
        let count = |status| counts.get(&status).copied().unwrap_or(0);
        Self {
            collection,
            synced: count(RecordStatus::Synced),
            created: count(RecordStatus::Created),
            updated: count(RecordStatus::Updated),
            deleted: count(RecordStatus::Deleted),
            token,
        }
    }

    fn pending(&self) -> u64 {
        self.created + self.updated + self.deleted
    }

    fn last_pull(&self) -> String {
        self.token
            .and_then(|t| t.to_datetime())
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "collection": self.collection,
            "synced": self.synced,
            "pending": {
                "created": self.created,
                "updated": self.updated,
                "deleted": self.deleted,
            },
            "token": self.token,
            "last_pull": self.last_pull(),
        })
    }
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config();

        let Some(local) = open_local(&config, false).await? else {
            formatter.error("No local data found. Run 'cadence sync' first.");
            return Ok(());
        };

        let collections = match self.collection {
            Some(collection) => vec![collection],
            None => config.enabled_collections(),
        };

        let mut statuses = Vec::with_capacity(collections.len());
        for collection in collections {
            statuses.push(collection_status(local.as_ref(), collection).await?);
        }

        if ctx.format.is_json() {
            let collections: Vec<_> = statuses.iter().map(CollectionStatus::to_json).collect();
            formatter.print_json(&json!({
                "signed_in": config.resolve_session().is_some(),
                "data_dir": config.storage.data_dir.display().to_string(),
                "collections": collections,
            }));
            return Ok(());
        }

        let total_pending: u64 = statuses.iter().map(CollectionStatus::pending).sum();
        if total_pending == 0 {
            formatter.success("All local changes are synced");
        } else {
            formatter.warn(&format!("{} waiting to be pushed", plural(total_pending, "change")));
        }
        if config.resolve_session().is_none() {
            formatter.warn("Not signed in; sync is disabled");
        }

        for status in &statuses {
            formatter.info("");
            formatter.info(status.collection.as_str());
            formatter.field("Synced", &plural(status.synced, "record"));
            if status.pending() > 0 {
                formatter.field(
                    "Pending",
                    &format!(
                        "{} created, {} updated, {} deleted",
                        status.created, status.updated, status.deleted
                    ),
                );
            }
            formatter.field("Last pull", &status.last_pull());
        }

        Ok(())
    }
}

async fn collection_status(
    local: &dyn ILocalStore,
    collection: Collection,
) -> Result<CollectionStatus> {
    let counts = local
        .status_counts(collection)
        .await
        .with_context(|| format!("Failed to count {} records", collection))?;
    let token = local
        .load_token(collection)
        .await
        .with_context(|| format!("Failed to read {} cursor", collection))?;
    Ok(CollectionStatus::from_counts(collection, &counts, token))
}
