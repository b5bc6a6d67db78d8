//! Session store port
//!
//! The engine never mutates a session. It reads the current one before each
//! request and signals `invalidate` when the repository reports the access
//! token as dead, leaving re-authorization to the caller.

use crate::domain::Session;

/// Port trait for reading the authorized session
#[async_trait::async_trait]
pub trait ISessionStore: Send + Sync {
    /// Returns the current session, or `None` when nobody is logged in
    async fn current(&self) -> anyhow::Result<Option<Session>>;

    /// Marks the current session as unusable
    async fn invalidate(&self, reason: &str) -> anyhow::Result<()>;
}
