//! Integration tests for feedvault-sync
//!
//! Runs the operation queue over an in-memory SQLite store with a scripted
//! record dispatcher, and drives the drain scheduler through connectivity
//! changes and manual triggers.

mod common;

mod test_queue;
mod test_scheduler;
