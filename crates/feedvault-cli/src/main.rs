//! Feedvault CLI - Offline-first writes to your personal data repository
//!
//! Provides commands for:
//! - Queueing record mutations and inspecting the queue
//! - Replaying queued operations now or in the background
//! - Requeueing or discarding failed operations
//! - Importing and removing the authorized session
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use feedvault_core::config::Config;

mod commands;
mod context;
mod output;

use commands::{
    config::ConfigCommand,
    queue::{ClearFailedCommand, QueueCommand, RetryFailedCommand},
    run::RunCommand,
    session::SessionCommand,
    status::StatusCommand,
    sync::SyncCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "feedvault",
    version,
    about = "Offline-first sync of feed reader records to your data repository"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show pending and failed counts and the current session
    Status(StatusCommand),
    /// Replay queued operations now
    Sync(SyncCommand),
    /// Add or list queued operations
    #[command(subcommand)]
    Queue(QueueCommand),
    /// Requeue failed operations with a fresh retry budget
    RetryFailed(RetryFailedCommand),
    /// Discard failed operations
    ClearFailed(ClearFailedCommand),
    /// Keep draining in the foreground until interrupted
    Run(RunCommand),
    /// Manage the authorized session
    #[command(subcommand)]
    Session(SessionCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Filter used when `RUST_LOG` is not set
fn default_filter(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    // `config` commands report parse errors themselves.
    let config = match &cli.command {
        Commands::Config(_) => Config::load_or_default(&config_path),
        _ => context::load_config(&config_path)?,
    };

    // Setup tracing
    let filter = default_filter(cli.verbose, &config.logging.level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Status(cmd) => cmd.execute(&config, format).await,
        Commands::Sync(cmd) => cmd.execute(&config, format).await,
        Commands::Queue(cmd) => cmd.execute(&config, format).await,
        Commands::RetryFailed(cmd) => cmd.execute(&config, format).await,
        Commands::ClearFailed(cmd) => cmd.execute(&config, format).await,
        Commands::Run(cmd) => cmd.execute(&config, format).await,
        Commands::Session(cmd) => cmd.execute(&config, format).await,
        Commands::Config(cmd) => cmd.execute(&config_path, format).await,
    }
}
