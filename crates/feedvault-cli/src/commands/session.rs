//! Session commands - Manage the authorized session
//!
//! The interactive authorization handshake happens elsewhere; its outcome is
//! a session record that `session import` stores in the system keyring.
//!
//! - `import <file|->` - Validate and store a session record
//! - `show` - Show the stored session, never its secrets
//! - `logout` - Discard queued operations, the session and cache markers
//! - `keygen` - Generate a proof key to bind during authorization

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::json;
use tracing::info;

use feedvault_core::config::Config;
use feedvault_core::domain::Session;
use feedvault_core::ports::ICacheFreshness;
use feedvault_pds::{DpopKey, KeyringSessionStore};

use crate::context::AppContext;
use crate::output::{get_formatter, plural, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// Store a session record (JSON) produced by the authorization flow
    Import {
        /// Path to the session record, or "-" for stdin
        file: PathBuf,
    },
    /// Show the stored session
    Show,
    /// Sign out and discard everything queued under this session
    Logout {
        /// Try one sync before discarding the queue
        #[arg(long)]
        drain_first: bool,
    },
    /// Generate a new proof-of-possession key
    Keygen,
}

impl SessionCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        match self {
            SessionCommand::Import { file } => import(config, file, format).await,
            SessionCommand::Show => show(format),
            SessionCommand::Logout { drain_first } => logout(config, *drain_first, format).await,
            SessionCommand::Keygen => keygen(format),
        }
    }
}

/// Reads and checks a session record
fn read_session(file: &Path) -> Result<Session> {
    let content = if file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read session from stdin")?;
        buf
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?
    };

    let session: Session =
        serde_json::from_str(&content).context("Session record is not valid JSON")?;
    session.validate().context("Session record is incomplete")?;
    DpopKey::from_material(&session.proof_key)
        .context("Session proof key is not a valid Ed25519 seed")?;
    Ok(session)
}

async fn import(config: &Config, file: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let session = read_session(file)?;
    let thumbprint = DpopKey::from_material(&session.proof_key)?.thumbprint();

    let ctx = AppContext::open(config).await?;
    let previous = ctx.sessions.load().ok().flatten();
    if let Some(previous) = &previous {
        if previous.did != session.did {
            let counts = ctx.queue.counts().await?;
            if counts.total() > 0 {
                formatter.warn(&format!(
                    "{} queued under {} will now be sent as {}",
                    plural(counts.total(), "operation", "operations"),
                    previous.did,
                    session.did
                ));
            }
        }
    }

    ctx.sessions.store(&session).context("Failed to store session")?;
    // A different session means the local cache has to be rebuilt.
    ctx.freshness.clear(&session.did).await?;
    info!(did = %session.did, "Imported session");

    if format.is_json() {
        formatter.print_json(&json!({
            "success": true,
            "did": session.did,
            "repository_url": session.repository_url,
            "expires_at": session.expires_at.to_rfc3339(),
            "jkt": thumbprint,
        }));
    } else {
        formatter.success(&format!("Signed in as {}", session.did));
        formatter.field("Repository", &session.repository_url);
        formatter.field("Expires", &session.expires_at.to_rfc3339());
        formatter.field("Key", &thumbprint);
    }

    ctx.close().await;
    Ok(())
}

fn show(format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let session = KeyringSessionStore::new()
        .load()
        .context("Failed to read session from keyring")?;

    let Some(session) = session else {
        if format.is_json() {
            formatter.print_json(&json!({ "session": null }));
        } else {
            formatter.info("Not signed in");
        }
        return Ok(());
    };

    let thumbprint = DpopKey::from_material(&session.proof_key)
        .map(|key| key.thumbprint())
        .unwrap_or_else(|e| format!("invalid ({e})"));

    if format.is_json() {
        formatter.print_json(&json!({
            "session": {
                "did": session.did,
                "repository_url": session.repository_url,
                "expires_at": session.expires_at.to_rfc3339(),
                "expired": session.is_expired(),
                "has_refresh_token": session.refresh_token.is_some(),
                "jkt": thumbprint,
            }
        }));
    } else {
        formatter.success(&format!("Signed in as {}", session.did));
        formatter.field("Repository", &session.repository_url);
        let expires = if session.is_expired() {
            format!("{} (expired)", session.expires_at.to_rfc3339())
        } else {
            session.expires_at.to_rfc3339()
        };
        formatter.field("Expires", &expires);
        formatter.field("Refresh", if session.refresh_token.is_some() { "yes" } else { "no" });
        formatter.field("Key", &thumbprint);
    }
    Ok(())
}

async fn logout(config: &Config, drain_first: bool, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let ctx = AppContext::open(config).await?;

    let report = if drain_first && ctx.sessions.load().ok().flatten().is_some() {
        ctx.queue.recover().await?;
        Some(ctx.queue.drain().await)
    } else {
        None
    };

    let discarded = ctx.queue.discard_all().await?;
    ctx.sessions.clear().context("Failed to remove session from keyring")?;
    ctx.freshness.clear_all().await?;
    info!(discarded, "Logged out");

    if format.is_json() {
        formatter.print_json(&json!({
            "success": true,
            "report": report,
            "discarded": discarded,
        }));
    } else {
        if let Some(report) = &report {
            super::sync::print_report(formatter.as_ref(), report);
        }
        formatter.success("Signed out");
        if discarded > 0 {
            formatter.warn(&format!(
                "Discarded {} that never reached the repository",
                plural(discarded, "operation", "operations")
            ));
        }
    }

    ctx.close().await;
    Ok(())
}

fn keygen(format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let key = DpopKey::generate();
    let material = key.to_material();

    if format.is_json() {
        formatter.print_json(&json!({
            "proof_key": material,
            "jwk": key.public_jwk(),
            "jkt": key.thumbprint(),
        }));
    } else {
        formatter.success("Generated a new Ed25519 proof key");
        formatter.field("JWK x", &key.public_jwk().x);
        formatter.field("Thumbprint", &key.thumbprint());
        formatter.info("");
        formatter.info("Put this in the session record as proof_key (keep it secret):");
        formatter.info(&format!("{{\"seed_b64\": \"{}\"}}", material.seed_b64()));
    }
    Ok(())
}
