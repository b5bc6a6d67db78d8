//! Domain error types
//!
//! This module defines error types specific to domain operations
//! (validation of keys, collections and statuses) and the structured
//! error reported by the repository boundary.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Logical record key is empty or too long
    #[error("Invalid record key: {0}")]
    InvalidRecordKey(String),

    /// Unknown record collection name
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// Unknown queue operation name
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Unknown queue entry status
    #[error("Unknown entry status: {0}")]
    UnknownStatus(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

/// Failure of a single call against the remote repository
///
/// This is the structured error kind reported at the executor boundary.
/// Retry decisions are made by matching on the variant, never on the
/// rendered message. Server-supplied status codes and error payloads are
/// carried verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The request never produced an HTTP response (refused, timeout, DNS, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// The repository answered with a non-success status
    #[error("Repository returned HTTP {status}: {}", describe(error, message))]
    Status {
        /// HTTP status code
        status: u16,
        /// Machine-readable error code from the response body
        error: Option<String>,
        /// Human-readable message from the response body
        message: Option<String>,
    },

    /// The repository rejected the access token as invalid or expired
    #[error("Session expired (HTTP {status}): {}", describe(error, message))]
    SessionExpired {
        /// HTTP status code (401)
        status: u16,
        /// Machine-readable error code from the response body
        error: Option<String>,
        /// Human-readable message from the response body
        message: Option<String>,
    },

    /// There is no authorized session to sign requests with
    #[error("No active session")]
    NoSession,

    /// The session store could not be read
    #[error("Session store unavailable: {0}")]
    SessionUnavailable(String),

    /// A success response could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The proof-of-possession assertion could not be produced
    #[error("Proof signing failed: {0}")]
    Proof(String),
}

impl RepositoryError {
    /// Returns the HTTP status code, if the repository produced a response
    pub fn status(&self) -> Option<u16> {
        match self {
            RepositoryError::Status { status, .. }
            | RepositoryError::SessionExpired { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn describe(error: &Option<String>, message: &Option<String>) -> String {
    match (error, message) {
        (Some(e), Some(m)) => format!("{e}: {m}"),
        (Some(e), None) => e.clone(),
        (None, Some(m)) => m.clone(),
        (None, None) => "no error payload".to_string(),
    }
}
