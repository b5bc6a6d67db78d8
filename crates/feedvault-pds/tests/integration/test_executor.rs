//! Integration tests for RepositoryClient::execute
//!
//! Covers the signed request shape, the one-shot nonce retry and the
//! mapping of failure responses onto RepositoryError.

use reqwest::Method;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feedvault_core::domain::RepositoryError;
use feedvault_pds::client::RepositoryClient;
use feedvault_pds::dpop::access_token_hash;

use crate::common::{self, ACCESS_TOKEN};

const PUT_PATH: &str = "/xrpc/com.atproto.repo.putRecord";

#[tokio::test]
async fn test_success_returns_parsed_body_and_sends_signed_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PUT_PATH))
        .and(header("Authorization", "DPoP test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cid": "abc"})))
        .expect(1)
        .mount(&server)
        .await;

    let session = common::session_for(&server);
    let client = RepositoryClient::new();
    let value = client
        .execute(&session, Method::POST, "com.atproto.repo.putRecord", Some(&json!({"a": 1})))
        .await
        .expect("execute failed");
    assert_eq!(value, json!({"cid": "abc"}));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let claims = common::proof_claims(&requests[0]);
    assert_eq!(claims.htm, "POST");
    assert_eq!(claims.htu, format!("{}{}", server.uri(), PUT_PATH));
    assert_eq!(claims.ath, Some(access_token_hash(ACCESS_TOKEN)));
    assert!(claims.nonce.is_none());
    assert_eq!(
        requests[0].body_json::<Value>().unwrap(),
        json!({"a": 1})
    );
}

#[tokio::test]
async fn test_nonce_challenge_is_retried_once_with_nonce() {
    let server = MockServer::start().await;
    common::mount_nonce_challenge_once(&server, PUT_PATH, "server-nonce-1").await;
    common::mount_put_record_ok(&server).await;

    let session = common::session_for(&server);
    let result = RepositoryClient::new()
        .execute(&session, Method::POST, "com.atproto.repo.putRecord", Some(&json!({})))
        .await;
    assert!(result.is_ok(), "challenge must be invisible: {result:?}");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2, "exactly two signed attempts");

    let first = common::proof_claims(&requests[0]);
    let second = common::proof_claims(&requests[1]);
    assert!(first.nonce.is_none());
    assert_eq!(second.nonce.as_deref(), Some("server-nonce-1"));
    assert_ne!(first.jti, second.jti, "each attempt is freshly signed");
    assert_eq!(first.htu, second.htu);
}

#[tokio::test]
async fn test_second_challenge_fails_with_server_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PUT_PATH))
        .respond_with(
            ResponseTemplate::new(400)
                .append_header("DPoP-Nonce", "rotating")
                .set_body_json(json!({"error": "use_dpop_nonce", "message": "again"})),
        )
        .mount(&server)
        .await;

    let session = common::session_for(&server);
    let err = RepositoryClient::new()
        .execute(&session, Method::POST, "com.atproto.repo.putRecord", None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RepositoryError::Status {
            status: 400,
            error: Some("use_dpop_nonce".to_string()),
            message: Some("again".to_string()),
        }
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_www_authenticate_challenge_on_401() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PUT_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .append_header("DPoP-Nonce", "hdr-nonce")
                .append_header("WWW-Authenticate", r#"DPoP error="use_dpop_nonce""#),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    common::mount_put_record_ok(&server).await;

    let session = common::session_for(&server);
    RepositoryClient::new()
        .execute(&session, Method::POST, "com.atproto.repo.putRecord", None)
        .await
        .expect("challenge via header must be absorbed");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        common::proof_claims(&requests[1]).nonce.as_deref(),
        Some("hdr-nonce")
    );
}

#[tokio::test]
async fn test_expired_token_maps_to_session_expired() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PUT_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": "ExpiredToken", "message": "Token has expired"})),
        )
        .mount(&server)
        .await;

    let session = common::session_for(&server);
    let err = RepositoryClient::new()
        .execute(&session, Method::POST, "com.atproto.repo.putRecord", None)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::SessionExpired { status: 401, .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_server_error_is_surfaced_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PUT_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let session = common::session_for(&server);
    let err = RepositoryClient::new()
        .execute(&session, Method::POST, "com.atproto.repo.putRecord", None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RepositoryError::Status {
            status: 503,
            error: None,
            message: Some("upstream down".to_string()),
        }
    );
}

#[tokio::test]
async fn test_empty_success_body_is_null() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.deleteRecord"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let session = common::session_for(&server);
    let value = RepositoryClient::new()
        .execute(&session, Method::POST, "com.atproto.repo.deleteRecord", None)
        .await
        .expect("execute failed");
    assert_eq!(value, Value::Null);
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let server = MockServer::start().await;
    let mut session = common::session_for(&server);
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    session.repository_url = format!("http://127.0.0.1:{port}");

    let err = RepositoryClient::new()
        .execute(&session, Method::POST, "com.atproto.repo.putRecord", None)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Network(_)), "got {err:?}");
}
