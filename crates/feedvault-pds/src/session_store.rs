//! Keyring-backed session storage
//!
//! The session record holds the access token and the private proof key, so
//! it lives in the OS credential store (GNOME Keyring, KDE Wallet, macOS
//! Keychain), serialized as JSON under the service name `feedvault`.

use anyhow::Context;
use thiserror::Error;
use tracing::{debug, info, warn};

use feedvault_core::{
    domain::{DomainError, Session},
    ports::ISessionStore,
};

/// Keyring service name
const KEYRING_SERVICE: &str = "feedvault";

/// Keyring user name used when none is given
const DEFAULT_ACCOUNT: &str = "default";

/// Errors that can occur while storing or loading sessions
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// The OS credential store rejected the operation
    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// The stored record is not a valid session document
    #[error("failed to (de)serialize session: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session is missing required fields
    #[error("invalid session: {0}")]
    Invalid(#[from] DomainError),
}

/// Stores and retrieves the session record from the system keyring
#[derive(Debug, Clone)]
pub struct KeyringSessionStore {
    account: String,
}

impl Default for KeyringSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringSessionStore {
    pub fn new() -> Self {
        Self::with_account(DEFAULT_ACCOUNT)
    }

    /// Uses a named keyring slot, e.g. one per profile
    pub fn with_account(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    fn entry(&self) -> Result<keyring::Entry, SessionStoreError> {
        Ok(keyring::Entry::new(KEYRING_SERVICE, &self.account)?)
    }

    /// Validates and stores a session, replacing any previous one
    pub fn store(&self, session: &Session) -> Result<(), SessionStoreError> {
        session.validate()?;
        let json = serde_json::to_string(session)?;
        self.entry()?.set_password(&json)?;
        info!(account = %self.account, did = %session.did, "Stored session in keyring");
        Ok(())
    }

    /// Loads the stored session
    ///
    /// # Returns
    /// `Some(Session)` if found, `None` if nothing is stored
    pub fn load(&self) -> Result<Option<Session>, SessionStoreError> {
        match self.entry()?.get_password() {
            Ok(json) => {
                let session: Session = serde_json::from_str(&json)?;
                debug!(account = %self.account, "Loaded session from keyring");
                Ok(Some(session))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(account = %self.account, "No session found in keyring");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Removes the stored session; a missing entry is not an error
    pub fn clear(&self) -> Result<(), SessionStoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                info!(account = %self.account, "Cleared session from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                debug!(account = %self.account, "No session to clear");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl ISessionStore for KeyringSessionStore {
    async fn current(&self) -> anyhow::Result<Option<Session>> {
        self.load().context("Failed to read session from keyring")
    }

    async fn invalidate(&self, reason: &str) -> anyhow::Result<()> {
        warn!(account = %self.account, reason, "Invalidating session");
        self.clear().context("Failed to remove invalidated session")
    }
}
