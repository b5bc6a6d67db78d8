//! Session domain entity
//!
//! A `Session` is the outcome of the interactive authorization handshake:
//! the repository it targets, the account identifier, the token pair and
//! the proof-of-possession key bound to those tokens.
//!
//! The engine only reads sessions. Creation happens when a session record
//! is imported, and destruction happens on logout or when the repository
//! reports the access token as dead.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// ProofKeyMaterial
// ============================================================================

/// Private half of the session's proof-of-possession keypair
///
/// Stored as the base64 encoding of a 32-byte Ed25519 seed. The public key
/// is derived from the seed whenever a proof is signed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofKeyMaterial {
    seed_b64: String,
}

impl ProofKeyMaterial {
    /// Wraps an already base64-encoded seed
    pub fn new(seed_b64: impl Into<String>) -> Self {
        Self {
            seed_b64: seed_b64.into(),
        }
    }

    /// Returns the base64-encoded seed
    pub fn seed_b64(&self) -> &str {
        &self.seed_b64
    }
}

impl fmt::Debug for ProofKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofKeyMaterial")
            .field("seed_b64", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Session
// ============================================================================

/// Authorized session against one repository
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Base URL of the repository server, e.g. `https://pds.example.com`
    pub repository_url: String,
    /// Account identifier the records are written under
    pub did: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub proof_key: ProofKeyMaterial,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Checks the fields the engine relies on
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.repository_url.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "repository_url must not be empty".to_string(),
            ));
        }
        if !self.repository_url.starts_with("http://")
            && !self.repository_url.starts_with("https://")
        {
            return Err(DomainError::ValidationFailed(format!(
                "repository_url must be an http(s) URL: {}",
                self.repository_url
            )));
        }
        if self.did.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "did must not be empty".to_string(),
            ));
        }
        if self.access_token.is_empty() {
            return Err(DomainError::ValidationFailed(
                "access_token must not be empty".to_string(),
            ));
        }
        if self.proof_key.seed_b64().is_empty() {
            return Err(DomainError::ValidationFailed(
                "proof_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns true if the access token has passed its expiry time
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Repository URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.repository_url.trim_end_matches('/')
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("repository_url", &self.repository_url)
            .field("did", &self.did)
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("proof_key", &self.proof_key)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
