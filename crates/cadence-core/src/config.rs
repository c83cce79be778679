//! Configuration module for Cadence.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Collection;
use crate::ports::Session;

/// Environment variable that overrides `session.access_token`.
pub const ACCESS_TOKEN_ENV: &str = "CADENCE_ACCESS_TOKEN";

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Cadence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub session: SessionConfig,
    pub sync: SyncConfig,
    pub backoff: BackoffConfig,
    /// Per-collection overrides keyed by collection name.
    pub collections: BTreeMap<String, CollectionConfig>,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub telemetry: TelemetryConfig,
}

/// Remote sync API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the sync API, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

/// Static session credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub user_id: Option<u64>,
    /// Bearer token. `None` until the user signs in.
    pub access_token: Option<String>,
}

/// Trigger and scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between polling triggers.
    pub polling_interval_secs: u64,
    /// Skip polling triggers while the application is hidden.
    pub poll_only_when_visible: bool,
    /// Seconds between connectivity probes in the daemon.
    pub connectivity_probe_secs: u64,
    /// Enabled collections by name. Empty means all.
    pub collections: Vec<String>,
}

/// Retry and backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    pub max_attempts: u32,
    /// Relative jitter applied to each delay, in `[0, 1)`.
    pub jitter: f64,
}

/// Per-collection overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Comparator name: `updated_at` or `max_progress`.
    pub comparator: String,
    /// Seconds a deleted record stays recoverable before it is purged.
    pub purge_grace_secs: Option<u64>,
}

/// Local database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the local database files.
    pub data_dir: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

/// Metrics output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// File the daemon writes Prometheus text metrics to on shutdown.
    pub metrics_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/cadence/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("cadence")
            .join("config.yaml")
    }

    /// Collections to synchronize, in [`Collection::ALL`] order.
    ///
    /// Unknown names are ignored here; [`Config::validate`] reports them.
    pub fn enabled_collections(&self) -> Vec<Collection> {
        if self.sync.collections.is_empty() {
            return Collection::ALL.to_vec();
        }
        Collection::ALL
            .into_iter()
            .filter(|c| self.sync.collections.iter().any(|name| name == c.as_str()))
            .collect()
    }

    /// Overrides for `collection`, or defaults when none are configured.
    pub fn collection(&self, collection: Collection) -> CollectionConfig {
        self.collections
            .get(collection.as_str())
            .cloned()
            .unwrap_or_default()
    }

    /// Session credentials, with [`ACCESS_TOKEN_ENV`] taking precedence.
    pub fn resolve_session(&self) -> Option<Session> {
        let token = std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.session.access_token.clone())?;
        Some(Session {
            user_id: self.session.user_id.unwrap_or_default(),
            access_token: token,
        })
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SyncConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    pub fn connectivity_probe_interval(&self) -> Duration {
        Duration::from_secs(self.connectivity_probe_secs)
    }
}

impl BackoffConfig {
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

impl CollectionConfig {
    pub fn purge_grace_period(&self) -> Option<Duration> {
        self.purge_grace_secs.map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

// Config, SessionConfig and TelemetryConfig derive Default.
// (clippy::derivable_impls)

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.cadence.app".to_string(),
            timeout_secs: 30,
            user_agent: format!("cadence/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            polling_interval_secs: 300,
            poll_only_when_visible: true,
            connectivity_probe_secs: 30,
            collections: Vec::new(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            max_ms: 8_000,
            max_attempts: 5,
            jitter: 0.25,
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            comparator: "updated_at".to_string(),
            purge_grace_secs: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("cadence"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.polling_interval_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `collections.<name>.comparator`.
pub const VALID_COMPARATORS: &[&str] = &["updated_at", "max_progress"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- remote ---
        if self.remote.base_url.trim().is_empty() {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: "must not be empty".into(),
            });
        } else if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: format!("must be an http(s) URL: {}", self.remote.base_url),
            });
        }
        if self.remote.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "remote.timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- sync ---
        if self.sync.polling_interval_secs == 0 {
            errors.push(ValidationError {
                field: "sync.polling_interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.connectivity_probe_secs == 0 {
            errors.push(ValidationError {
                field: "sync.connectivity_probe_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        for name in &self.sync.collections {
            if name.parse::<Collection>().is_err() {
                errors.push(ValidationError {
                    field: "sync.collections".into(),
                    message: format!("unknown collection '{}'", name),
                });
            }
        }

        // --- backoff ---
        if self.backoff.base_ms == 0 {
            errors.push(ValidationError {
                field: "backoff.base_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.backoff.base_ms > self.backoff.max_ms {
            errors.push(ValidationError {
                field: "backoff.base_ms".into(),
                message: format!(
                    "base_ms ({}) must not exceed max_ms ({})",
                    self.backoff.base_ms, self.backoff.max_ms
                ),
            });
        }
        if self.backoff.max_attempts == 0 {
            errors.push(ValidationError {
                field: "backoff.max_attempts".into(),
                message: "must be greater than 0".into(),
            });
        }
        if !(0.0..1.0).contains(&self.backoff.jitter) {
            errors.push(ValidationError {
                field: "backoff.jitter".into(),
                message: "must be in range 0.0..1.0".into(),
            });
        }

        // --- collections ---
        for (name, overrides) in &self.collections {
            if name.parse::<Collection>().is_err() {
                errors.push(ValidationError {
                    field: format!("collections.{}", name),
                    message: "unknown collection".into(),
                });
            }
            if !VALID_COMPARATORS.contains(&overrides.comparator.as_str()) {
                errors.push(ValidationError {
                    field: format!("collections.{}.comparator", name),
                    message: format!(
                        "invalid comparator '{}'; valid options: {}",
                        overrides.comparator,
                        VALID_COMPARATORS.join(", ")
                    ),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use cadence_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .remote_base_url("https://sync.example.com")
///     .polling_interval_secs(60)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- remote ---

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    pub fn remote_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.remote.timeout_secs = seconds;
        self
    }

    // --- session ---

    pub fn session(mut self, user_id: u64, access_token: impl Into<String>) -> Self {
        self.config.session.user_id = Some(user_id);
        self.config.session.access_token = Some(access_token.into());
        self
    }

    // --- sync ---

    pub fn polling_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.polling_interval_secs = seconds;
        self
    }

    pub fn poll_only_when_visible(mut self, only_visible: bool) -> Self {
        self.config.sync.poll_only_when_visible = only_visible;
        self
    }

    pub fn enabled_collections(mut self, collections: &[Collection]) -> Self {
        self.config.sync.collections = collections.iter().map(|c| c.as_str().to_string()).collect();
        self
    }

    // --- backoff ---

    pub fn backoff(mut self, base_ms: u64, max_ms: u64, max_attempts: u32) -> Self {
        self.config.backoff.base_ms = base_ms;
        self.config.backoff.max_ms = max_ms;
        self.config.backoff.max_attempts = max_attempts;
        self
    }

    pub fn backoff_jitter(mut self, jitter: f64) -> Self {
        self.config.backoff.jitter = jitter;
        self
    }

    // --- collections ---

    pub fn comparator(mut self, collection: Collection, name: impl Into<String>) -> Self {
        self.config
            .collections
            .entry(collection.as_str().to_string())
            .or_default()
            .comparator = name.into();
        self
    }

    pub fn purge_grace_secs(mut self, collection: Collection, seconds: u64) -> Self {
        self.config
            .collections
            .entry(collection.as_str().to_string())
            .or_default()
            .purge_grace_secs = Some(seconds);
        self
    }

    // --- storage ---

    pub fn data_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.data_dir = dir;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- telemetry ---

    pub fn metrics_file(mut self, path: PathBuf) -> Self {
        self.config.telemetry.metrics_file = Some(path);
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
