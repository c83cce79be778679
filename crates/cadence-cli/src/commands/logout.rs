//! Logout command - Sign out and remove local data
//!
//! Wipes the local snapshot and every pull cursor, deletes database files
//! of older schema versions, and clears the stored access token from the
//! configuration file. Unsynced local changes are lost, so the command
//! asks for `--force` when any are pending.

use anyhow::{Context, Result};
use cadence_core::config::Config;
use cadence_core::ports::ILocalStore;
use cadence_sync::SessionTeardown;
use clap::Args;
use tracing::info;

use super::{open_local, CommandContext};
use crate::output::plural;

#[derive(Debug, Args)]
pub struct LogoutCommand {
    /// Discard local changes that were never pushed
    #[arg(long)]
    pub force: bool,
}

impl LogoutCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config();

        let mut removed_files = Vec::new();
        if let Some(local) = open_local(&config, false).await? {
            let pending = pending_changes(local.as_ref(), &config).await?;
            if pending > 0 && !self.force {
                formatter.error(&format!(
                    "{} not synced yet. Run 'cadence sync' first or pass --force.",
                    plural(pending, "local change")
                ));
                return Ok(());
            }

            let report = SessionTeardown::new(local)
                .with_legacy_purge(config.storage.data_dir.clone())
                .run()
                .await?;
            removed_files = report.legacy_files_removed;
        }

        let token_cleared = clear_stored_token(&ctx.config_path)?;
        info!(legacy_files = removed_files.len(), token_cleared, "Signed out");

        if ctx.format.is_json() {
            let removed: Vec<_> = removed_files
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            formatter.print_json(&serde_json::json!({
                "success": true,
                "token_cleared": token_cleared,
                "legacy_files_removed": removed,
            }));
        } else {
            formatter.success("Signed out and local data removed");
            for path in &removed_files {
                formatter.info(&format!("Removed {}", path.display()));
            }
            if std::env::var(cadence_core::config::ACCESS_TOKEN_ENV).is_ok() {
                formatter.warn("CADENCE_ACCESS_TOKEN is still set in the environment");
            }
        }
        Ok(())
    }
}

async fn pending_changes(local: &dyn ILocalStore, config: &Config) -> Result<u64> {
    let mut pending = 0;
    for collection in config.enabled_collections() {
        pending += local
            .pending(collection)
            .await
            .with_context(|| format!("Failed to read pending {} changes", collection))?
            .len() as u64;
    }
    Ok(pending)
}

/// Removes `session.access_token` from the config file; false when there was none
fn clear_stored_token(config_path: &std::path::Path) -> Result<bool> {
    if !config_path.exists() {
        return Ok(false);
    }
    let mut config = Config::load(config_path).context("Failed to read configuration")?;
    if config.session.access_token.take().is_none() {
        return Ok(false);
    }

    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
    std::fs::write(config_path, yaml).context("Failed to write configuration file")?;
    Ok(true)
}
