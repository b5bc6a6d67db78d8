//! Configuration module for Feedvault.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Feedvault.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub repository: RepositoryConfig,
    pub queue: QueueConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// Repository client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Lifetime of a signed proof in seconds (`exp - iat`).
    pub proof_lifetime_secs: u64,
}

/// Operation queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of retryable failures after which an entry is parked as failed.
    pub max_retries: u32,
    /// Path to the SQLite database holding the queue.
    pub database: PathBuf,
}

/// Drain scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between periodic drains while online.
    pub drain_interval_secs: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
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
    /// Typically `$XDG_CONFIG_HOME/feedvault/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        feedvault_dir(dirs::config_dir()).join("config.yaml")
    }
}

/// `feedvault` under a platform directory, or under the temp dir when the
/// platform reports none (no `$HOME`).
fn feedvault_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(std::env::temp_dir).join("feedvault")
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            proof_lifetime_secs: 60,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            database: feedvault_dir(dirs::data_local_dir()).join("feedvault.db"),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drain_interval_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"queue.max_retries"`.
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

/// Longest accepted proof lifetime; servers reject proofs far older than this.
pub const MAX_PROOF_LIFETIME_SECS: u64 = 3600;

fn must_be_positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- repository ---
        must_be_positive(
            &mut errors,
            "repository.request_timeout_secs",
            self.repository.request_timeout_secs,
        );
        must_be_positive(
            &mut errors,
            "repository.proof_lifetime_secs",
            self.repository.proof_lifetime_secs,
        );
        if self.repository.proof_lifetime_secs > MAX_PROOF_LIFETIME_SECS {
            errors.push(ValidationError {
                field: "repository.proof_lifetime_secs".into(),
                message: format!("must be at most {MAX_PROOF_LIFETIME_SECS}"),
            });
        }

        // --- queue ---
        must_be_positive(
            &mut errors,
            "queue.max_retries",
            u64::from(self.queue.max_retries),
        );
        if self.queue.database.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "queue.database".into(),
                message: "must not be empty".into(),
            });
        }

        // --- sync ---
        must_be_positive(
            &mut errors,
            "sync.drain_interval_secs",
            self.sync.drain_interval_secs,
        );

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
/// use feedvault_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .queue_max_retries(3)
///     .sync_drain_interval_secs(120)
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

    // --- repository ---

    pub fn repository_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.repository.request_timeout_secs = seconds;
        self
    }

    pub fn repository_proof_lifetime_secs(mut self, seconds: u64) -> Self {
        self.config.repository.proof_lifetime_secs = seconds;
        self
    }

    // --- queue ---

    pub fn queue_max_retries(mut self, n: u32) -> Self {
        self.config.queue.max_retries = n;
        self
    }

    pub fn queue_database(mut self, path: PathBuf) -> Self {
        self.config.queue.database = path;
        self
    }

    // --- sync ---

    pub fn sync_drain_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.drain_interval_secs = seconds;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
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
