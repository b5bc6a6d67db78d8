//! Shared test helpers for repository integration tests
//!
//! Provides a static session store, a session pointing at a wiremock
//! server, and helpers to decode the proofs the server received.

use std::sync::Mutex;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feedvault_core::{domain::Session, ports::ISessionStore};
use feedvault_pds::dpop::{DpopKey, ProofClaims};

pub const ACCESS_TOKEN: &str = "test-access-token";
pub const DID: &str = "did:plc:testuser";

/// Builds a session targeting the given mock server
pub fn session_for(server: &MockServer) -> Session {
    Session {
        repository_url: server.uri(),
        did: DID.to_string(),
        access_token: ACCESS_TOKEN.to_string(),
        refresh_token: Some("test-refresh-token".to_string()),
        proof_key: DpopKey::generate().to_material(),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

/// In-memory session store
pub struct StaticSessionStore {
    session: Mutex<Option<Session>>,
    pub invalidations: Mutex<Vec<String>>,
}

impl StaticSessionStore {
    pub fn new(session: Option<Session>) -> Self {
        Self {
            session: Mutex::new(session),
            invalidations: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl ISessionStore for StaticSessionStore {
    async fn current(&self) -> anyhow::Result<Option<Session>> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn invalidate(&self, reason: &str) -> anyhow::Result<()> {
        self.invalidations.lock().unwrap().push(reason.to_string());
        *self.session.lock().unwrap() = None;
        Ok(())
    }
}

/// Decodes the claims of the proof carried by a received request
pub fn proof_claims(request: &wiremock::Request) -> ProofClaims {
    let proof = request
        .headers
        .get("DPoP")
        .expect("request carries a DPoP header")
        .to_str()
        .unwrap();
    let claims = proof.split('.').nth(1).expect("compact JWS");
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(claims).unwrap()).unwrap()
}

/// Mounts a nonce challenge that answers the first matching request only
pub async fn mount_nonce_challenge_once(server: &MockServer, xrpc_path: &str, nonce: &str) {
    Mock::given(method("POST"))
        .and(path(xrpc_path))
        .respond_with(
            ResponseTemplate::new(400)
                .append_header("DPoP-Nonce", nonce)
                .set_body_json(serde_json::json!({
                    "error": "use_dpop_nonce",
                    "message": "Authorization server requires nonce in DPoP proof"
                })),
        )
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// Mounts a successful putRecord endpoint
pub async fn mount_put_record_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.repo.putRecord"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "uri": format!("at://{DID}/app.feedvault.readPosition/article-42"),
            "cid": "bafyreitestcid"
        })))
        .mount(server)
        .await;
}
