//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// EntryId
// ============================================================================

/// Identifier for queue entries
///
/// This is a purely local identifier for the storage row. It is never sent
/// to the repository and is unrelated to the record's logical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Create a new random EntryId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an EntryId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid EntryId: {e}")))
    }
}

// ============================================================================
// RecordKey
// ============================================================================

/// Maximum length of a logical record key
const MAX_KEY_LEN: usize = 1024;

/// Maximum length of a repository record key
const MAX_RKEY_LEN: usize = 512;

/// Stable client-side identifier of a logical record within its collection
///
/// The same key is used across the create/update/delete lifecycle of a
/// record, independent of any identifier the repository may assign.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordKey(String);

impl RecordKey {
    /// Creates a new RecordKey
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRecordKey` if the key is empty, only
    /// whitespace, or longer than 1024 characters.
    pub fn new(key: impl Into<String>) -> Result<Self, DomainError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(DomainError::InvalidRecordKey(
                "key must not be empty".to_string(),
            ));
        }
        if key.chars().count() > MAX_KEY_LEN {
            return Err(DomainError::InvalidRecordKey(format!(
                "key exceeds {MAX_KEY_LEN} characters"
            )));
        }
        Ok(Self(key))
    }

    /// Returns the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives the repository record key for this logical key
    ///
    /// Keys that are already valid repository keys are used verbatim so
    /// records stay readable on the server. Anything else (feed URLs, keys
    /// with spaces or slashes) is mapped to `k` + 32 hex chars of its
    /// SHA-256. The mapping is deterministic, so replaying a write after a
    /// lost response targets the same record.
    pub fn record_key(&self) -> String {
        if is_valid_rkey(&self.0) {
            return self.0.clone();
        }
        let digest = Sha256::digest(self.0.as_bytes());
        let hex: String = digest.iter().take(16).map(|b| format!("{b:02x}")).collect();
        format!("k{hex}")
    }
}

fn is_valid_rkey(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_RKEY_LEN
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '~' | '-'))
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RecordKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RecordKey> for String {
    fn from(key: RecordKey) -> Self {
        key.0
    }
}

impl FromStr for RecordKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
