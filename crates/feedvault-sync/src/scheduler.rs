//! Drain scheduler - turns connectivity, timers and user requests into drains
//!
//! The [`DrainScheduler`] owns the loop that decides when the
//! [`OperationQueue`] replays its pending entries:
//!
//! ```text
//! ConnectivityMonitor ──→ watch::Receiver ──┐
//! interval tick ────────────────────────────┼──→ DrainScheduler ──→ OperationQueue::drain()
//! SyncHandle::trigger_sync() ──→ mpsc ──────┘
//! ```
//!
//! Drains only start while online. Overlapping requests are harmless: the
//! queue collapses them into the drain already in flight.
//!
//! After the repository rejects the session, automatic drains are paused
//! until the next manual trigger so a dead session does not fail one entry
//! per tick.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch},
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    connectivity::{Connectivity, ConnectivityMonitor},
    queue::{DrainReport, OperationQueue},
};

/// Why a drain was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Reconnected,
    Timer,
    Manual,
}

impl Trigger {
    fn as_str(&self) -> &'static str {
        match self {
            Trigger::Reconnected => "reconnected",
            Trigger::Timer => "timer",
            Trigger::Manual => "manual",
        }
    }
}

// ============================================================================
// SyncHandle
// ============================================================================

/// Cloneable handle for requesting a "sync now"
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<()>,
}

impl SyncHandle {
    /// Requests an immediate drain
    ///
    /// A request that arrives while another is still waiting is merged into
    /// it.
    ///
    /// # Returns
    /// `false` if the scheduler has stopped
    pub fn trigger_sync(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("Sync already requested");
                true
            }
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

// ============================================================================
// DrainScheduler
// ============================================================================

/// Schedules queue drains
pub struct DrainScheduler {
    queue: Arc<OperationQueue>,
    connectivity: watch::Receiver<Connectivity>,
    trigger_rx: mpsc::Receiver<()>,
    interval: Duration,
}

impl DrainScheduler {
    /// Creates a new `DrainScheduler`
    ///
    /// # Arguments
    /// * `queue` - The queue to drain
    /// * `connectivity` - Source of online/offline transitions
    /// * `interval` - Period of the background drain timer
    ///
    /// # Returns
    /// The scheduler and a [`SyncHandle`] for manual triggers. The scheduler
    /// stops once every handle has been dropped.
    pub fn new(
        queue: Arc<OperationQueue>,
        connectivity: &ConnectivityMonitor,
        interval: Duration,
    ) -> (Self, SyncHandle) {
        let (tx, trigger_rx) = mpsc::channel(1);

        info!(
            interval_secs = interval.as_secs(),
            "Creating drain scheduler"
        );

        let scheduler = Self {
            queue,
            connectivity: connectivity.subscribe(),
            trigger_rx,
            interval,
        };
        (scheduler, SyncHandle { tx })
    }

    /// Main event loop
    ///
    /// Runs until `cancel` fires or every [`SyncHandle`] is dropped. The first
    /// timer tick is immediate, so a scheduler started online drains right
    /// away.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Drain scheduler starting");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut online = self.connectivity.borrow_and_update().is_online();
        let mut connectivity_open = true;
        let mut paused = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Cancellation requested, scheduler shutting down");
                    break;
                }

                changed = self.connectivity.changed(), if connectivity_open => {
                    if changed.is_err() {
                        debug!("Connectivity source dropped, keeping last state");
                        connectivity_open = false;
                        continue;
                    }
                    let now_online = self.connectivity.borrow_and_update().is_online();
                    let reconnected = now_online && !online;
                    online = now_online;
                    if reconnected && !paused {
                        self.drain(Trigger::Reconnected, &mut paused).await;
                    }
                }

                _ = ticker.tick() => {
                    if !online {
                        debug!("Offline, skipping timer drain");
                    } else if paused {
                        debug!("Drains paused until re-authorization");
                    } else {
                        self.drain(Trigger::Timer, &mut paused).await;
                    }
                }

                request = self.trigger_rx.recv() => {
                    match request {
                        Some(()) => {
                            paused = false;
                            if online {
                                self.drain(Trigger::Manual, &mut paused).await;
                            } else {
                                info!("Sync requested while offline, will drain on reconnect");
                            }
                        }
                        None => {
                            info!("All sync handles dropped, scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        }

        info!("Drain scheduler stopped");
    }

    async fn drain(&self, trigger: Trigger, paused: &mut bool) -> DrainReport {
        debug!(trigger = trigger.as_str(), "Starting drain");
        let report = self.queue.drain().await;
        if report.session_invalidated {
            error!("Repository rejected the session; automatic sync paused until re-authorization");
            *paused = true;
        }
        report
    }
}
