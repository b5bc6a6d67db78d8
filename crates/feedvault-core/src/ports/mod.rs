//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IQueueStore`] - Durable storage for queue entries
//! - [`IRecordDispatcher`] - Performs one queued mutation against the repository
//! - [`ISessionStore`] - Read access to the authorized session, plus invalidation
//! - [`ICacheFreshness`] - Persisted "last hydrated" markers keyed by identity

pub mod cache_freshness;
pub mod queue_store;
pub mod record_dispatcher;
pub mod session_store;

pub use cache_freshness::ICacheFreshness;
pub use queue_store::IQueueStore;
pub use record_dispatcher::IRecordDispatcher;
pub use session_store::ISessionStore;
