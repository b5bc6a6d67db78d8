//! Collection-specific record dispatcher
//!
//! Maps queue entries onto repository record calls:
//!
//! - create / update → `com.atproto.repo.putRecord`
//! - delete → `com.atproto.repo.deleteRecord`
//!
//! `putRecord` is an upsert keyed by `(collection, rkey)`, and the record key
//! is derived deterministically from the logical key, so replaying an entry
//! whose response was lost targets the same record.

use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use feedvault_core::{
    domain::{Operation, QueueEntry, RepositoryError, Session},
    ports::{IRecordDispatcher, ISessionStore},
};

use crate::client::RepositoryClient;

/// XRPC method for creating or replacing a record
pub const PUT_RECORD: &str = "com.atproto.repo.putRecord";

/// XRPC method for deleting a record
pub const DELETE_RECORD: &str = "com.atproto.repo.deleteRecord";

/// Dispatches queue entries to the repository of the current session
pub struct PdsRecordDispatcher {
    client: RepositoryClient,
    sessions: Arc<dyn ISessionStore>,
}

impl PdsRecordDispatcher {
    pub fn new(client: RepositoryClient, sessions: Arc<dyn ISessionStore>) -> Self {
        Self { client, sessions }
    }

    async fn session(&self) -> Result<Session, RepositoryError> {
        match self.sessions.current().await {
            Ok(Some(session)) => Ok(session),
            Ok(None) => Err(RepositoryError::NoSession),
            Err(e) => Err(RepositoryError::SessionUnavailable(format!("{e:#}"))),
        }
    }
}

/// Builds the XRPC method and body for an entry
///
/// # Returns
/// `(nsid, body)` for the repository call
pub fn build_request(entry: &QueueEntry, did: &str) -> (&'static str, Value) {
    let collection = entry.collection().nsid();
    let rkey = entry.key().record_key();
    match entry.operation() {
        Operation::Create | Operation::Update => (
            PUT_RECORD,
            json!({
                "repo": did,
                "collection": collection,
                "rkey": rkey,
                "record": record_value(collection, entry.payload()),
            }),
        ),
        Operation::Delete => (
            DELETE_RECORD,
            json!({
                "repo": did,
                "collection": collection,
                "rkey": rkey,
            }),
        ),
    }
}

/// Record body with its `$type`
///
/// Object payloads become the record itself; anything else is wrapped
/// under `value`.
fn record_value(nsid: &str, payload: &Value) -> Value {
    match payload {
        Value::Object(fields) => {
            let mut record = fields.clone();
            record.insert("$type".to_string(), Value::String(nsid.to_string()));
            Value::Object(record)
        }
        other => json!({ "$type": nsid, "value": other }),
    }
}

#[async_trait::async_trait]
impl IRecordDispatcher for PdsRecordDispatcher {
    async fn dispatch(&self, entry: &QueueEntry) -> Result<(), RepositoryError> {
        let session = self.session().await?;
        let (nsid, body) = build_request(entry, &session.did);

        debug!(
            entry_id = %entry.id(),
            collection = %entry.collection(),
            operation = %entry.operation(),
            nsid,
            "Dispatching queued operation"
        );

        self.client
            .execute(&session, Method::POST, nsid, Some(&body))
            .await?;

        info!(
            entry_id = %entry.id(),
            collection = %entry.collection(),
            key = %entry.key(),
            operation = %entry.operation(),
            "Repository confirmed operation"
        );
        Ok(())
    }
}
