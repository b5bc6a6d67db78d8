//! Feedvault PDS - Personal data server client
//!
//! Provides async client for:
//! - Proof-of-possession (DPoP) signing with the session's Ed25519 key
//! - Authenticated XRPC calls with transparent nonce-challenge retry
//! - Mapping queued operations onto record writes
//! - Session storage in the system keyring
//!
//! ## Modules
//!
//! - [`dpop`] - Proof signing
//! - [`client`] - Repository request executor
//! - [`records`] - Collection-specific record dispatcher
//! - [`session_store`] - Keyring-backed session store

pub mod client;
pub mod dpop;
pub mod records;
pub mod session_store;

pub use client::RepositoryClient;
pub use dpop::{DpopError, DpopKey, DpopSigner};
pub use records::PdsRecordDispatcher;
pub use session_store::{KeyringSessionStore, SessionStoreError};
