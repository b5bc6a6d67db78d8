//! Status command - Show queue counts and the current session
//!
//! The pending and failed counts are the queue's only outward signal; this
//! command reports them together with who the queue would replay as.

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use serde_json::json;
use tracing::warn;

use feedvault_core::config::Config;
use feedvault_core::ports::ICacheFreshness;

use crate::context::AppContext;
use crate::output::{get_formatter, plural, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let ctx = AppContext::open(config).await?;
        let counts = ctx.queue.counts().await?;

        let session = match ctx.sessions.load() {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Failed to read session");
                formatter.warn(&format!("Could not read session: {e}"));
                None
            }
        };
        let last_hydrated = match &session {
            Some(s) => ctx.freshness.last_hydrated(&s.did).await?,
            None => None,
        };

        if format.is_json() {
            let session_json = session.as_ref().map(|s| {
                json!({
                    "did": s.did,
                    "repository_url": s.repository_url,
                    "expires_at": s.expires_at.to_rfc3339(),
                    "expired": s.is_expired(),
                })
            });
            formatter.print_json(&json!({
                "pending": counts.pending_count(),
                "processing": counts.processing,
                "failed": counts.failed_count(),
                "session": session_json,
                "last_hydrated": last_hydrated.map(|t| t.to_rfc3339()),
            }));
        } else {
            if counts.total() == 0 {
                formatter.success("All changes are synced");
            } else {
                formatter.success(&format!(
                    "{} waiting to sync",
                    plural(counts.pending_count(), "change", "changes")
                ));
            }
            formatter.field("Pending", &counts.pending_count().to_string());
            formatter.field("Failed", &counts.failed_count().to_string());
            if counts.failed > 0 {
                formatter.info("Run 'feedvault retry-failed' or 'feedvault clear-failed'");
            }

            formatter.info("");
            match &session {
                Some(s) => {
                    formatter.field("Account", &s.did);
                    formatter.field("Repository", &s.repository_url);
                    let expiry = if s.is_expired() {
                        format!("{} (expired)", s.expires_at.to_rfc3339())
                    } else {
                        let minutes = (s.expires_at - Utc::now()).num_minutes();
                        format!("{} (in {} min)", s.expires_at.to_rfc3339(), minutes)
                    };
                    formatter.field("Expires", &expiry);
                    let hydrated = last_hydrated
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string());
                    formatter.field("Hydrated", &hydrated);
                }
                None => {
                    formatter.field("Account", "not signed in");
                    formatter.info("Run 'feedvault session import <file>' to sign in");
                }
            }
        }

        ctx.close().await;
        Ok(())
    }
}
