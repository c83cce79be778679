//! Sync command - Push local changes and pull remote ones
//!
//! Provides the `cadence sync` CLI command which:
//! 1. Loads configuration and resolves the session
//! 2. Opens the local snapshot and wires the HTTP protocol
//! 3. Runs one cycle per enabled collection (or just `--collection`)
//! 4. Displays per-collection results

use std::sync::Arc;

use anyhow::{Context, Result};
use cadence_core::domain::Collection;
use cadence_remote::{ApiClient, HttpSyncProtocol};
use cadence_sync::environment::SessionState;
use cadence_sync::{
    CollectionOutcome, ExecutionOutcome, StoreRegistry, SyncContext, SyncGroup,
    SyncOrchestrator, SyncReport, TracingTelemetry,
};
use clap::Args;
use tracing::info;

use super::{open_local, parse_collection, CommandContext};
use crate::output::{plural, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Sync only this collection
    #[arg(long, value_parser = parse_collection)]
    pub collection: Option<Collection>,
}

impl SyncCommand {
    /// Wires up the adapters, runs the cycles and prints the reports
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config();

        let Some(session) = config.resolve_session() else {
            formatter.error(
                "No session configured. Set session.access_token or CADENCE_ACCESS_TOKEN.",
            );
            return Ok(());
        };

        let local = open_local(&config, true)
            .await?
            .context("Local database unavailable")?;
        let session = Arc::new(SessionState::new(Some(session)));
        let client = ApiClient::new(&config.remote, session.clone())
            .context("Failed to create API client")?;

        let context = Arc::new(
            SyncContext::builder()
                .session(session)
                .telemetry(Arc::new(TracingTelemetry))
                .build(),
        );
        let registry = StoreRegistry::from_config(
            &config,
            context.clone(),
            Arc::new(HttpSyncProtocol::new(client)),
            local,
        );
        let orchestrator =
            SyncOrchestrator::new(context, vec![SyncGroup::new(registry.stores())]);

        formatter.info("Starting synchronization...");
        let outcomes: Vec<CollectionOutcome> = match self.collection {
            Some(collection) => {
                let outcome = orchestrator.request_collection_sync(collection, "cli").await;
                let Some(outcome) = outcome else {
                    formatter.error(&format!("Collection '{}' is not enabled", collection));
                    return Ok(());
                };
                vec![(collection, outcome)]
            }
            None => orchestrator.request_sync("cli").await,
        };
        orchestrator.stop().await;

        let failed = outcomes.iter().filter(|(_, o)| !o.is_completed()).count();
        info!(collections = outcomes.len(), failed, "Sync command finished");

        if ctx.format.is_json() {
            let results: Vec<_> = outcomes.iter().map(|(c, o)| outcome_json(*c, o)).collect();
            formatter.print_json(&serde_json::json!({
                "success": failed == 0,
                "collections": results,
            }));
        } else {
            for (collection, outcome) in &outcomes {
                print_outcome(&*formatter, *collection, outcome);
            }
        }

        if failed > 0 {
            anyhow::bail!("{} of {} collections did not sync", failed, outcomes.len());
        }
        Ok(())
    }
}

fn outcome_json(
    collection: Collection,
    outcome: &ExecutionOutcome<SyncReport>,
) -> serde_json::Value {
    match outcome {
        ExecutionOutcome::Completed(report) => serde_json::json!({
            "collection": collection,
            "outcome": outcome.label(),
            "report": report,
        }),
        ExecutionOutcome::Failed(err) => serde_json::json!({
            "collection": collection,
            "outcome": outcome.label(),
            "error": err.to_string(),
        }),
        _ => serde_json::json!({
            "collection": collection,
            "outcome": outcome.label(),
        }),
    }
}

fn print_outcome(
    formatter: &dyn OutputFormatter,
    collection: Collection,
    outcome: &ExecutionOutcome<SyncReport>,
) {
    match outcome {
        ExecutionOutcome::Completed(report) => {
            if report.pushed == 0 && report.pulled == 0 && report.rejected.is_empty() {
                formatter.success(&format!("{}: already up to date", collection));
            } else {
                formatter.success(&format!("{}: synced in {}ms", collection, report.duration_ms));
            }
            if report.pushed > 0 {
                formatter.field("Pushed", &plural(report.pushed, "change"));
            }
            if report.pulled > 0 {
                formatter.field("Pulled", &plural(report.pulled, "entry"));
                formatter.field("Applied", &plural(report.applied(), "change"));
            }
            if report.purged > 0 {
                formatter.field("Purged", &plural(report.purged, "deleted record"));
            }
            for rejected in &report.rejected {
                formatter.warn(&format!(
                    "{} record {} rejected ({})",
                    collection, rejected.id, rejected.failure_type
                ));
                for (field, messages) in &rejected.errors {
                    formatter.info(&format!("  - {}: {}", field, messages.join(", ")));
                }
            }
        }
        ExecutionOutcome::Dropped(reason) => {
            formatter.warn(&format!("{}: skipped ({})", collection, reason));
        }
        ExecutionOutcome::Unreachable => {
            formatter.error(&format!("{}: server unreachable", collection));
        }
        ExecutionOutcome::Cancelled => {
            formatter.warn(&format!("{}: cancelled", collection));
        }
        ExecutionOutcome::Failed(err) => {
            formatter.error(&format!("{}: {}", collection, err));
        }
    }
}
