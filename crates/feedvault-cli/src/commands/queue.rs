//! Queue commands - Inspect and manage queued operations
//!
//! - `feedvault queue add <operation> <collection> <key> [--payload JSON]`
//! - `feedvault queue list [--status STATUS]`
//! - `feedvault retry-failed` / `feedvault clear-failed`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::{json, Value};

use feedvault_core::config::Config;
use feedvault_core::domain::{Collection, EntryStatus, Operation, QueueEntry, RecordKey};
use feedvault_sync::EnqueueOutcome;

use crate::context::AppContext;
use crate::output::{get_formatter, plural, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// Record a mutation for the next sync
    Add {
        /// create, update or delete
        operation: Operation,
        /// read-position, share, follow or subscription
        collection: Collection,
        /// Logical key of the record within its collection
        key: String,
        /// Record fields as a JSON document
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// List queued operations, oldest first
    List {
        /// Only show entries with this status (pending, processing, failed)
        #[arg(long)]
        status: Option<EntryStatus>,
    },
}

impl QueueCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let ctx = AppContext::open(config).await?;
        let result = match self {
            QueueCommand::Add {
                operation,
                collection,
                key,
                payload,
            } => add(&ctx, *operation, *collection, key, payload, format).await,
            QueueCommand::List { status } => list(&ctx, *status, format).await,
        };
        ctx.close().await;
        result
    }
}

fn parse_payload(payload: &str) -> Result<Value> {
    serde_json::from_str(payload).context("Payload must be a JSON document")
}

async fn add(
    ctx: &AppContext,
    operation: Operation,
    collection: Collection,
    key: &str,
    payload: &str,
    format: OutputFormat,
) -> Result<()> {
    let formatter = get_formatter(format);
    let key = RecordKey::new(key).context("Invalid record key")?;
    let payload = parse_payload(payload)?;

    let outcome = ctx
        .queue
        .enqueue(operation, collection, key.clone(), payload)
        .await?;
    let counts = ctx.queue.counts().await?;

    if format.is_json() {
        formatter.print_json(&json!({
            "result": outcome,
            "pending": counts.pending_count(),
        }));
    } else {
        let message = match outcome {
            EnqueueOutcome::Inserted(_) => format!("Queued {operation} of {collection}/{key}"),
            EnqueueOutcome::Replaced(_) => {
                format!("Updated queued operation for {collection}/{key}")
            }
            EnqueueOutcome::Cancelled => {
                format!("Cancelled queued operation for {collection}/{key}")
            }
        };
        formatter.success(&message);
        formatter.field("Pending", &counts.pending_count().to_string());
    }
    Ok(())
}

fn entry_json(entry: &QueueEntry) -> Value {
    json!({
        "id": entry.id().to_string(),
        "operation": entry.operation(),
        "collection": entry.collection(),
        "key": entry.key().as_str(),
        "payload": entry.payload(),
        "timestamp": entry.timestamp(),
        "retry_count": entry.retry_count(),
        "status": entry.status(),
        "last_error": entry.last_error(),
    })
}

async fn list(ctx: &AppContext, status: Option<EntryStatus>, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let entries: Vec<QueueEntry> = ctx
        .queue
        .entries()
        .await?
        .into_iter()
        .filter(|e| status.map_or(true, |s| e.status() == s))
        .collect();

    if format.is_json() {
        let items: Vec<Value> = entries.iter().map(entry_json).collect();
        formatter.print_json(&json!({ "entries": items }));
        return Ok(());
    }

    if entries.is_empty() {
        formatter.success("Queue is empty");
        return Ok(());
    }

    formatter.success(&plural(entries.len() as u64, "queued operation", "queued operations"));
    for entry in &entries {
        formatter.info(&format!(
            "{:<10} {:<6} {}/{}  retries={}",
            entry.status().as_str(),
            entry.operation().as_str(),
            entry.collection(),
            entry.key(),
            entry.retry_count(),
        ));
        if let Some(error) = entry.last_error() {
            formatter.info(&format!("           last error: {error}"));
        }
    }
    Ok(())
}

// ============================================================================
// Failed-entry escape hatches
// ============================================================================

#[derive(Debug, Args)]
pub struct RetryFailedCommand {
    /// Drain immediately after requeueing
    #[arg(long)]
    pub sync: bool,
}

impl RetryFailedCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let ctx = AppContext::open(config).await?;

        let requeued = ctx.queue.retry_failed().await?;
        let report = if self.sync && requeued > 0 {
            Some(ctx.queue.drain().await)
        } else {
            None
        };

        if format.is_json() {
            formatter.print_json(&json!({
                "requeued": requeued,
                "report": report,
            }));
        } else {
            formatter.success(&format!(
                "Requeued {}",
                plural(requeued, "failed operation", "failed operations")
            ));
            if let Some(report) = &report {
                super::sync::print_report(formatter.as_ref(), report);
            }
        }

        ctx.close().await;
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct ClearFailedCommand {}

impl ClearFailedCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let ctx = AppContext::open(config).await?;

        let removed = ctx.queue.clear_failed().await?;
        if format.is_json() {
            formatter.print_json(&json!({ "removed": removed }));
        } else {
            formatter.success(&format!(
                "Discarded {}",
                plural(removed, "failed operation", "failed operations")
            ));
        }

        ctx.close().await;
        Ok(())
    }
}
