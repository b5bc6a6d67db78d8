//! Feedvault Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core of the offline write
//! reconciliation engine:
//! - **Domain entities** - `QueueEntry`, `Session`, `RecordKey`, `RepositoryError`
//! - **Port definitions** - Traits for adapters: `IQueueStore`, `IRecordDispatcher`,
//!   `ISessionStore`, `ICacheFreshness`
//! - **Configuration** - YAML-backed settings for the queue, repository and scheduler
//!
//! # Architecture
//!
//! The domain module contains pure types with no I/O. Ports define the trait
//! interfaces that adapter crates (`feedvault-cache`, `feedvault-pds`)
//! implement and that `feedvault-sync` orchestrates.

pub mod config;
pub mod domain;
pub mod ports;
