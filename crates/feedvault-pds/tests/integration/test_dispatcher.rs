//! Integration tests for PdsRecordDispatcher
//!
//! Verifies that queued entries become the expected record calls.

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feedvault_core::domain::{Collection, Operation, QueueEntry, RecordKey, RepositoryError};
use feedvault_core::ports::IRecordDispatcher;
use feedvault_pds::{PdsRecordDispatcher, RepositoryClient};

use crate::common::{self, StaticSessionStore, DID};

fn entry(operation: Operation, collection: Collection, key: &str, payload: Value) -> QueueEntry {
    QueueEntry::new(operation, collection, RecordKey::new(key).unwrap(), payload, 1)
}

#[tokio::test]
async fn test_update_is_sent_as_put_record() {
    let server = MockServer::start().await;
    common::mount_put_record_ok(&server).await;

    let sessions = Arc::new(StaticSessionStore::new(Some(common::session_for(&server))));
    let dispatcher = PdsRecordDispatcher::new(RepositoryClient::new(), sessions);

    let e = entry(
        Operation::Update,
        Collection::ReadPosition,
        "article-42",
        json!({"starred": true}),
    );
    dispatcher.dispatch(&e).await.expect("dispatch failed");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["repo"], DID);
    assert_eq!(body["collection"], "app.feedvault.readPosition");
    assert_eq!(body["rkey"], "article-42");
    assert_eq!(body["record"]["starred"], true);
    assert_eq!(body["record"]["$type"], "app.feedvault.readPosition");
}

#[tokio::test]
async fn test_delete_is_sent_as_delete_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.deleteRecord"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let sessions = Arc::new(StaticSessionStore::new(Some(common::session_for(&server))));
    let dispatcher = PdsRecordDispatcher::new(RepositoryClient::new(), sessions);

    let e = entry(Operation::Delete, Collection::Follow, "did:plc:friend", json!({}));
    dispatcher.dispatch(&e).await.expect("dispatch failed");

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["collection"], "app.feedvault.follow");
    assert_eq!(body["rkey"], "did:plc:friend");
}

#[tokio::test]
async fn test_dispatch_absorbs_nonce_challenge() {
    let server = MockServer::start().await;
    common::mount_nonce_challenge_once(&server, "/xrpc/com.atproto.repo.putRecord", "n-7").await;
    common::mount_put_record_ok(&server).await;

    let sessions = Arc::new(StaticSessionStore::new(Some(common::session_for(&server))));
    let dispatcher = PdsRecordDispatcher::new(RepositoryClient::new(), sessions);

    let e = entry(Operation::Create, Collection::Share, "share-7", json!({"url": "https://x"}));
    dispatcher.dispatch(&e).await.expect("dispatch failed");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_session_fails_without_network_call() {
    let server = MockServer::start().await;
    let sessions = Arc::new(StaticSessionStore::new(None));
    let dispatcher = PdsRecordDispatcher::new(RepositoryClient::new(), sessions);

    let e = entry(Operation::Update, Collection::Subscription, "feed-1", json!({}));
    let err = dispatcher.dispatch(&e).await.unwrap_err();
    assert_eq!(err, RepositoryError::NoSession);
    assert!(server.received_requests().await.unwrap().is_empty());
}
