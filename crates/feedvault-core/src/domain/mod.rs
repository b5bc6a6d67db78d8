//! Domain entities and business logic
//!
//! This module contains the core domain types for Feedvault:
//! - Newtypes for type-safe identifiers and record keys
//! - Queue entries and their status state machine
//! - The authorized session consumed by the request signer
//! - Domain-specific and repository-boundary error types

pub mod errors;
pub mod newtypes;
pub mod queue_entry;
pub mod session;

// Re-export commonly used types
pub use errors::{DomainError, RepositoryError};
pub use newtypes::*;
pub use queue_entry::{Collection, EntryStatus, Operation, QueueCounts, QueueEntry};
pub use session::{ProofKeyMaterial, Session};
