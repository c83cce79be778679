//! Config command - View and manage Cadence configuration
//!
//! Provides the `cadence config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON), token redacted
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors
//! 4. Prints the configuration file path

use std::path::PathBuf;

use anyhow::{Context, Result};
use cadence_core::config::{CollectionConfig, Config};
use cadence_core::domain::Collection;
use clap::Subcommand;
use tracing::info;

use super::CommandContext;

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.polling_interval_secs")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("remote.base_url", "Sync API base URL"),
    ("remote.timeout_secs", "Per-request timeout"),
    ("remote.user_agent", "User-Agent header"),
    ("session.user_id", "Signed-in user id"),
    ("session.access_token", "Bearer token ('none' to clear)"),
    ("sync.polling_interval_secs", "Seconds between polls"),
    ("sync.poll_only_when_visible", "true|false"),
    ("sync.connectivity_probe_secs", "Seconds between daemon probes"),
    ("sync.collections", "Comma-separated names, empty for all"),
    ("backoff.base_ms", "First retry delay"),
    ("backoff.max_ms", "Retry delay cap"),
    ("backoff.max_attempts", "Attempts per sync request"),
    ("backoff.jitter", "Relative jitter in [0, 1)"),
    ("collections.<name>.comparator", "updated_at|max_progress"),
    ("collections.<name>.purge_grace_secs", "Seconds, or 'none'"),
    ("storage.data_dir", "Local database directory"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.json", "true|false"),
    ("telemetry.metrics_file", "Daemon metrics path, or 'none'"),
];

impl ConfigCommand {
    /// Execute the config command
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Set { key, value } => self.execute_set(ctx, key, value),
            ConfigCommand::Validate => self.execute_validate(ctx),
            ConfigCommand::Path => {
                let formatter = ctx.formatter();
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "config_path": ctx.config_path.display().to_string(),
                        "exists": ctx.config_path.exists(),
                    }));
                } else {
                    println!("{}", ctx.config_path.display());
                }
                Ok(())
            }
        }
    }

    /// Show current configuration
    fn execute_show(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = redacted(ctx.load_config());

        if ctx.format.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    /// Set a configuration value using dot-notation
    fn execute_set(&self, ctx: &CommandContext, key: &str, value: &str) -> Result<()> {
        let formatter = ctx.formatter();
        let config_path = &ctx.config_path;
        let mut config = Config::load_or_default(config_path);

        info!(key = %key, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{}': {}", key, e));
                formatter.info("");
                formatter.info("Supported keys:");
                for (name, help) in SUPPORTED_KEYS {
                    formatter.info(&format!("  {:<38} - {}", name, help));
                }
            }
            return Ok(());
        }

        let errors: Vec<String> = config.validate().iter().map(|e| e.to_string()).collect();
        if !errors.is_empty() {
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "errors": errors,
                }));
            } else {
                formatter.error(&format!("Invalid value for '{}': {}", key, errors.join("; ")));
            }
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
        }
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        std::fs::write(config_path, &yaml).context("Failed to write configuration file")?;

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "config_path": config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {}", key));
            formatter.info(&format!("Saved to {}", config_path.display()));
        }
        Ok(())
    }

    /// Validate configuration file
    fn execute_validate(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config_path = &ctx.config_path;

        let config = match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                let message = if config_path.exists() {
                    format!("Failed to parse configuration: {}", e)
                } else {
                    "Configuration file not found. Using defaults.".to_string()
                };
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [message],
                    }));
                } else {
                    formatter.error(&message);
                    formatter.info(&format!("File: {}", config_path.display()));
                }
                return Ok(());
            }
        };

        let errors = config.validate();

        if ctx.format.is_json() {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            formatter.info(&format!("File: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        Ok(())
    }
}

fn redacted(mut config: Config) -> Config {
    if config.session.access_token.is_some() {
        config.session.access_token = Some("<redacted>".to_string());
    }
    config
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("Invalid value '{}' for {}", value, key))
}

/// `"none"` and the empty string mean unset
fn optional(value: &str) -> Option<&str> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value)
    }
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    if let Some(rest) = key.strip_prefix("collections.") {
        let (name, field) = rest
            .split_once('.')
            .with_context(|| format!("Expected collections.<name>.<field>, got '{}'", key))?;
        let collection: Collection = name.parse()?;
        let entry = config
            .collections
            .entry(collection.as_str().to_string())
            .or_insert_with(CollectionConfig::default);
        match field {
            "comparator" => entry.comparator = value.to_string(),
            "purge_grace_secs" => {
                entry.purge_grace_secs = optional(value).map(|v| parse(key, v)).transpose()?;
            }
            _ => anyhow::bail!("Unknown configuration key: '{}'", key),
        }
        return Ok(());
    }

    match key {
        // --- remote ---
        "remote.base_url" => config.remote.base_url = value.to_string(),
        "remote.timeout_secs" => config.remote.timeout_secs = parse(key, value)?,
        "remote.user_agent" => config.remote.user_agent = value.to_string(),

        // --- session ---
        "session.user_id" => {
            config.session.user_id = optional(value).map(|v| parse(key, v)).transpose()?;
        }
        "session.access_token" => {
            config.session.access_token = optional(value).map(str::to_string);
        }

        // --- sync ---
        "sync.polling_interval_secs" => config.sync.polling_interval_secs = parse(key, value)?,
        "sync.poll_only_when_visible" => config.sync.poll_only_when_visible = parse(key, value)?,
        "sync.connectivity_probe_secs" => {
            config.sync.connectivity_probe_secs = parse(key, value)?;
        }
        "sync.collections" => {
            let names: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect();
            for name in &names {
                name.parse::<Collection>()?;
            }
            config.sync.collections = names;
        }

        // --- backoff ---
        "backoff.base_ms" => config.backoff.base_ms = parse(key, value)?,
        "backoff.max_ms" => config.backoff.max_ms = parse(key, value)?,
        "backoff.max_attempts" => config.backoff.max_attempts = parse(key, value)?,
        "backoff.jitter" => config.backoff.jitter = parse(key, value)?,

        // --- storage ---
        "storage.data_dir" => config.storage.data_dir = PathBuf::from(value),

        // --- logging ---
        "logging.level" => config.logging.level = value.to_string(),
        "logging.json" => config.logging.json = parse(key, value)?,

        // --- telemetry ---
        "telemetry.metrics_file" => {
            config.telemetry.metrics_file = optional(value).map(PathBuf::from);
        }

        _ => anyhow::bail!("Unknown configuration key: '{}'", key),
    }

    Ok(())
}
