//! Subcommand implementations and the helpers they share

pub mod config;
pub mod logout;
pub mod show;
pub mod status;
pub mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cadence_cache::{database_file_name, DatabasePool, SqliteLocalStore};
use cadence_core::config::Config;
use cadence_core::domain::Collection;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Global options every subcommand runs with
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub format: OutputFormat,
    pub quiet: bool,
    pub config_path: PathBuf,
}

impl CommandContext {
    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format, self.quiet)
    }

    /// The configuration file, or defaults when it is missing or broken
    pub fn load_config(&self) -> Config {
        let config = Config::load_or_default(&self.config_path);
        tracing::info!(config_path = %self.config_path.display(), "Loaded configuration");
        config
    }
}

/// Opens the local snapshot, creating it when `create` is set
///
/// Returns `None` when the database does not exist and `create` is false.
pub async fn open_local(config: &Config, create: bool) -> Result<Option<Arc<SqliteLocalStore>>> {
    let data_dir = &config.storage.data_dir;
    if !create && !data_dir.join(database_file_name()).exists() {
        return Ok(None);
    }

    let pool = DatabasePool::open_in(data_dir)
        .await
        .with_context(|| format!("Failed to open database in {}", data_dir.display()))?;
    Ok(Some(Arc::new(SqliteLocalStore::new(pool.pool().clone()))))
}

/// clap value parser for collection names
pub fn parse_collection(value: &str) -> Result<Collection, String> {
    value.parse::<Collection>().map_err(|_| {
        let names: Vec<_> = Collection::ALL.iter().map(|c| c.as_str()).collect();
        format!("expected one of: {}", names.join(", "))
    })
}
