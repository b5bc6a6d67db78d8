//! Config command - View and manage Feedvault configuration
//!
//! Provides the `feedvault config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Sets individual values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use feedvault_core::config::Config;

use crate::context::load_config;
use crate::output::{get_formatter, OutputFormat};

/// Keys accepted by `config set`, with a short description
const SETTABLE_KEYS: &[(&str, &str)] = &[
    ("repository.request_timeout_secs", "Per-request timeout"),
    ("repository.proof_lifetime_secs", "Validity of each signed proof"),
    ("queue.max_retries", "Attempts before an entry is parked as failed"),
    ("queue.database", "Path of the queue database"),
    ("sync.drain_interval_secs", "Seconds between background drains"),
    ("logging.level", "trace|debug|info|warn|error"),
];

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "queue.max_retries")
        key: String,
        /// New value
        value: String,
    },
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(config_path, format),
            ConfigCommand::Set { key, value } => execute_set(config_path, key, value, format),
            ConfigCommand::Validate => execute_validate(config_path, format),
        }
    }
}

fn execute_show(config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let config = load_config(config_path)?;

    info!(config_path = %config_path.display(), "Showing configuration");

    if format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", config_path.display()));
        formatter.info("");
        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }
    Ok(())
}

fn execute_set(config_path: &Path, key: &str, value: &str, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let mut config = load_config(config_path)?;

    info!(key = %key, value = %value, "Setting configuration value");

    if let Err(e) = apply_config_value(&mut config, key, value) {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "error": e.to_string(),
            }));
        } else {
            formatter.error(&format!("Failed to set '{key}': {e}"));
            formatter.info("");
            formatter.info("Supported keys:");
            for (name, description) in SETTABLE_KEYS {
                formatter.info(&format!("  {name:<34} - {description}"));
            }
        }
        return Ok(());
    }

    let errors = config.validate();
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "errors": messages,
            }));
        } else {
            formatter.error(&format!("Invalid value for '{key}': {}", messages.join("; ")));
        }
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
    std::fs::write(config_path, yaml).context("Failed to write configuration file")?;

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "key": key,
            "value": value,
            "config_path": config_path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Set {key} = {value}"));
        formatter.info(&format!("Saved to {}", config_path.display()));
    }
    Ok(())
}

fn execute_validate(config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    if !config_path.exists() {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "errors": [],
                "defaults": true,
            }));
        } else {
            formatter.success("No configuration file, using defaults");
            formatter.info(&format!("Expected at {}", config_path.display()));
        }
        return Ok(());
    }

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": [format!("Failed to parse configuration: {e}")],
                }));
            } else {
                formatter.error(&format!("Failed to parse configuration: {e}"));
                formatter.info(&format!("File: {}", config_path.display()));
            }
            return Ok(());
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");
    let errors = config.validate();

    if format.is_json() {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": messages,
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
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }
    Ok(())
}

/// Applies one dot-notation key to the configuration
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
        value
            .parse()
            .map_err(|_| anyhow::anyhow!("'{value}' is not a valid number for {key}"))
    }

    match key {
        "repository.request_timeout_secs" => {
            config.repository.request_timeout_secs = number(key, value)?
        }
        "repository.proof_lifetime_secs" => {
            config.repository.proof_lifetime_secs = number(key, value)?
        }
        "queue.max_retries" => config.queue.max_retries = number(key, value)?,
        "queue.database" => config.queue.database = PathBuf::from(value),
        "sync.drain_interval_secs" => config.sync.drain_interval_secs = number(key, value)?,
        "logging.level" => config.logging.level = value.to_string(),
        _ => anyhow::bail!("Unknown configuration key '{key}'"),
    }
    Ok(())
}
