//! Run command - Keep the queue draining in the foreground
//!
//! Starts the drain scheduler with:
//! - a reachability probe against the session's repository as the
//!   connectivity signal
//! - SIGUSR1 as a "sync now" trigger
//! - graceful shutdown on SIGTERM/SIGINT
//!
//! Queue counts are logged whenever they change.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use feedvault_core::config::Config;
use feedvault_core::domain::QueueCounts;
use feedvault_core::ports::ISessionStore;
use feedvault_sync::{Connectivity, ConnectivityMonitor, DrainScheduler, SyncHandle};

use crate::context::AppContext;
use crate::output::{get_formatter, plural, OutputFormat};

/// Seconds between reachability probes
const PROBE_INTERVAL: Duration = Duration::from_secs(15);

/// How long a probe waits for the TCP handshake
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Args)]
pub struct RunCommand {
    /// Override the background drain interval (seconds)
    #[arg(long)]
    pub interval: Option<u64>,
}

impl RunCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let ctx = AppContext::open(config).await?;

        let recovered = ctx.queue.recover().await?;
        if recovered > 0 {
            formatter.info(&format!(
                "Recovered {} from an interrupted run",
                plural(recovered, "operation", "operations")
            ));
        }

        let interval_secs = self
            .interval
            .unwrap_or(config.sync.drain_interval_secs)
            .max(1);
        let shutdown = CancellationToken::new();
        let monitor = Arc::new(ConnectivityMonitor::new(Connectivity::Offline));
        let (scheduler, handle) = DrainScheduler::new(
            ctx.queue.clone(),
            &monitor,
            Duration::from_secs(interval_secs),
        );

        tokio::spawn(shutdown_signal(shutdown.clone()));
        let probe = tokio::spawn(probe_connectivity(
            ctx.sessions.clone(),
            monitor.clone(),
            shutdown.clone(),
        ));
        let observer = tokio::spawn(log_counts(ctx.queue.subscribe(), shutdown.clone()));
        #[cfg(unix)]
        tokio::spawn(forward_sync_requests(handle.clone(), shutdown.clone()));

        formatter.success(&format!(
            "Feedvault running, draining every {interval_secs}s (Ctrl+C to stop)"
        ));

        scheduler.run(shutdown.clone()).await;
        drop(handle);
        shutdown.cancel();
        let _ = probe.await;
        let _ = observer.await;

        let counts = ctx.queue.counts().await?;
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "stopped": true,
                "pending": counts.pending_count(),
                "failed": counts.failed_count(),
            }));
        } else {
            formatter.success("Stopped");
            formatter.field("Pending", &counts.pending_count().to_string());
            formatter.field("Failed", &counts.failed_count().to_string());
        }

        ctx.close().await;
        Ok(())
    }
}

// ============================================================================
// Connectivity probe
// ============================================================================

/// Host and port to probe for a repository URL
fn probe_target(repository_url: &str) -> Option<(String, u16)> {
    let url = url::Url::parse(repository_url).ok()?;
    let host = url.host_str()?.to_string();
    let port = url.port_or_known_default()?;
    Some((host, port))
}

async fn reachable(repository_url: &str) -> bool {
    let Some((host, port)) = probe_target(repository_url) else {
        return false;
    };
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((host.as_str(), port))).await,
        Ok(Ok(_))
    )
}

/// Marks the monitor online while the session's repository accepts connections
async fn probe_connectivity(
    sessions: Arc<dyn ISessionStore>,
    monitor: Arc<ConnectivityMonitor>,
    shutdown: CancellationToken,
) {
    loop {
        let state = match sessions.current().await {
            Ok(Some(session)) if reachable(&session.repository_url).await => Connectivity::Online,
            Ok(Some(session)) => {
                debug!(repository = %session.repository_url, "Repository unreachable");
                Connectivity::Offline
            }
            Ok(None) => {
                debug!("No session, staying offline");
                Connectivity::Offline
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Failed to read session");
                Connectivity::Offline
            }
        };
        monitor.set(state);

        tokio::select! {
            _ = tokio::time::sleep(PROBE_INTERVAL) => {}
            _ = shutdown.cancelled() => break,
        }
    }
}

// ============================================================================
// Observers and signals
// ============================================================================

async fn log_counts(mut counts: watch::Receiver<QueueCounts>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            changed = counts.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *counts.borrow_and_update();
                info!(
                    pending = current.pending_count(),
                    failed = current.failed_count(),
                    "Queue counts changed"
                );
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

/// Turns SIGUSR1 into a manual sync request
#[cfg(unix)]
async fn forward_sync_requests(handle: SyncHandle, shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGUSR1 handler, manual sync disabled");
            return;
        }
    };

    loop {
        tokio::select! {
            received = usr1.recv() => {
                if received.is_none() {
                    break;
                }
                info!("Received SIGUSR1, requesting sync");
                if !handle.trigger_sync() {
                    break;
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
        _ = token.cancelled() => return,
    }

    token.cancel();
}
