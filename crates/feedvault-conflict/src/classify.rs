//! Failure classification
//!
//! Maps a structured [`RepositoryError`] onto the queue's retry decision.
//! Matching is on the error kind and HTTP status only, never on message text.

use serde::Serialize;

use feedvault_core::domain::RepositoryError;

/// What the queue should do with an entry whose dispatch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Transient fault; try again on a later drain until the retry ceiling
    Retryable,
    /// The repository rejected the operation itself; retrying would repeat it
    Permanent,
    /// The session is dead; stop draining and force re-authorization
    SessionInvalid,
}

impl FailureClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureClass::Retryable)
    }
}

/// HTTP statuses outside 5xx that still describe a transient condition
const RETRYABLE_CLIENT_STATUSES: &[u16] = &[408, 429];

/// Classifies a repository failure
pub fn classify(error: &RepositoryError) -> FailureClass {
    match error {
        RepositoryError::Network(_) | RepositoryError::SessionUnavailable(_) => {
            FailureClass::Retryable
        }
        RepositoryError::SessionExpired { .. } | RepositoryError::NoSession => {
            FailureClass::SessionInvalid
        }
        RepositoryError::Status { status, .. } => {
            if *status >= 500 || RETRYABLE_CLIENT_STATUSES.contains(status) {
                FailureClass::Retryable
            } else {
                FailureClass::Permanent
            }
        }
        RepositoryError::InvalidResponse(_) | RepositoryError::Proof(_) => {
            FailureClass::Permanent
        }
    }
}
