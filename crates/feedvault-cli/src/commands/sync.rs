//! Sync command - Replay pending operations now
//!
//! Provides the `feedvault sync` CLI command which:
//! 1. Loads configuration and opens the queue database
//! 2. Checks that a session is stored in the system keyring
//! 3. Returns entries orphaned by an interrupted run to pending
//! 4. Runs one drain pass and displays the report

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use feedvault_core::config::Config;
use feedvault_sync::DrainReport;

use crate::context::AppContext;
use crate::output::{get_formatter, plural, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Requeue failed operations before draining
    #[arg(long)]
    pub retry_failed: bool,
}

impl SyncCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let ctx = AppContext::open(config).await?;

        let session = ctx
            .sessions
            .load()
            .context("Failed to read session from keyring")?;
        let Some(session) = session else {
            formatter.error("No session. Run 'feedvault session import <file>' first.");
            ctx.close().await;
            return Ok(());
        };
        if session.is_expired() {
            formatter.warn("The stored access token has expired; the repository may reject it");
        }
        info!(did = %session.did, "Syncing queued operations");

        ctx.queue.recover().await?;
        if self.retry_failed {
            let requeued = ctx.queue.retry_failed().await?;
            formatter.info(&format!(
                "Requeued {}",
                plural(requeued, "failed operation", "failed operations")
            ));
        }

        let report = ctx.queue.drain().await;
        let counts = ctx.queue.counts().await?;

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "report": report,
                "pending": counts.pending_count(),
                "failed": counts.failed_count(),
            }));
        } else {
            print_report(formatter.as_ref(), &report);
            formatter.field("Pending", &counts.pending_count().to_string());
            formatter.field("Failed", &counts.failed_count().to_string());
        }

        ctx.close().await;
        Ok(())
    }
}

pub(crate) fn print_report(formatter: &dyn OutputFormatter, report: &DrainReport) {
    if report.skipped {
        formatter.warn("Another sync is already running");
        return;
    }
    if report.processed == 0 && report.failed == 0 && report.retried == 0 {
        formatter.success("Nothing to sync");
        return;
    }

    formatter.success(&format!(
        "Synced {}",
        plural(report.processed, "operation", "operations")
    ));
    if report.retried > 0 {
        formatter.info(&format!(
            "{} will be retried",
            plural(report.retried, "operation", "operations")
        ));
    }
    if report.failed > 0 {
        formatter.error(&format!(
            "{} failed",
            plural(report.failed, "operation", "operations")
        ));
    }
    if report.session_invalidated {
        formatter.error(
            "The repository rejected the session. Run 'feedvault session import <file>' to sign in again.",
        );
    }
}
