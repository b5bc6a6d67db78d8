//! Conflict resolver
//!
//! Decides what becomes of a queued entry when a new operation arrives for
//! the same `(collection, key)`. The table is keyed by
//! `(existing operation, incoming operation)`:
//!
//! | existing | incoming | result |
//! |----------|----------|--------|
//! | create   | delete   | cancel: the record never reached the repository |
//! | create   | update   | create with the incoming payload |
//! | update   | update   | update with the incoming payload |
//! | any      | delete   | delete with the incoming payload |
//! | delete   | create   | create with the incoming payload |
//! | other    | other    | incoming operation and payload |
//!
//! A hot key therefore never holds more than one entry, and the surviving
//! entry always reflects the last user-visible action.

use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use feedvault_core::domain::Operation;

/// Outcome of folding an incoming operation into a queued one
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Resolution {
    /// Overwrite the queued entry with this operation and payload
    Replace {
        operation: Operation,
        payload: Value,
    },
    /// Both operations cancel out; remove the queued entry
    Cancel,
}

/// Resolves an incoming operation against the queued one for the same key
///
/// # Arguments
///
/// * `existing` - Operation of the entry already in the queue
/// * `incoming` - Newly submitted operation
/// * `incoming_payload` - Payload of the new submission
pub fn resolve(existing: Operation, incoming: Operation, incoming_payload: Value) -> Resolution {
    let resolution = match (existing, incoming) {
        (Operation::Create, Operation::Delete) => Resolution::Cancel,
        (Operation::Create, Operation::Update) => Resolution::Replace {
            operation: Operation::Create,
            payload: incoming_payload,
        },
        (Operation::Update, Operation::Update) => Resolution::Replace {
            operation: Operation::Update,
            payload: incoming_payload,
        },
        (_, Operation::Delete) => Resolution::Replace {
            operation: Operation::Delete,
            payload: incoming_payload,
        },
        (Operation::Delete, Operation::Create) => Resolution::Replace {
            operation: Operation::Create,
            payload: incoming_payload,
        },
        (_, incoming) => Resolution::Replace {
            operation: incoming,
            payload: incoming_payload,
        },
    };

    trace!(
        existing = %existing,
        incoming = %incoming,
        resolution = %resolution_name(&resolution),
        "Resolved queued operation"
    );
    resolution
}

fn resolution_name(resolution: &Resolution) -> &'static str {
    match resolution {
        Resolution::Replace { operation, .. } => operation.as_str(),
        Resolution::Cancel => "cancel",
    }
}
