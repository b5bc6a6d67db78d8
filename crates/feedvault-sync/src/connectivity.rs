//! Online/offline signal
//!
//! Whoever can observe the network (a reachability probe, a platform
//! callback) sets the state; the scheduler subscribes and drains on the
//! transition back online.

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

/// Network reachability of the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connectivity::Online => write!(f, "online"),
            Connectivity::Offline => write!(f, "offline"),
        }
    }
}

/// Publishes connectivity transitions
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<Connectivity>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Sets the current state
    ///
    /// Subscribers are only notified when the state actually changes.
    ///
    /// # Returns
    /// `true` if this was a transition
    pub fn set(&self, state: Connectivity) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            info!(state = %state, "Connectivity changed");
        }
        changed
    }

    pub fn set_online(&self) -> bool {
        self.set(Connectivity::Online)
    }

    pub fn set_offline(&self) -> bool {
        self.set(Connectivity::Offline)
    }

    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}
