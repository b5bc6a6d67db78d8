//! Repository request executor
//!
//! Performs one authenticated XRPC call against the user's repository.
//! Each attempt carries `Authorization: DPoP <token>` and a freshly signed
//! `DPoP` proof.
//!
//! ## Nonce challenges
//!
//! The repository may answer a request with HTTP 400/401, the error code
//! `use_dpop_nonce` and a `DPoP-Nonce` response header. That is not a
//! failure: the server cannot hand out a nonce before the first round
//! trip. The executor re-signs with the nonce and resends exactly once.
//! A second challenge fails the call with the server's payload.
//!
//! ```text
//!   Unsigned ──sign──► SignedNoNonce ──send──┬──► Succeeded
//!                                            ├──► Failed
//!                                            └─challenge─► SignedWithNonce ──send──┬──► Succeeded
//!                                                                                  └──► Failed
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use feedvault_pds::client::RepositoryClient;
//! use reqwest::Method;
//!
//! # async fn example(session: feedvault_core::domain::Session) -> anyhow::Result<()> {
//! let client = RepositoryClient::new();
//! let body = serde_json::json!({"repo": session.did});
//! let value = client
//!     .execute(&session, Method::POST, "com.atproto.repo.putRecord", Some(&body))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use feedvault_core::domain::{RepositoryError, Session};

use crate::dpop::{DpopKey, DpopSigner, DEFAULT_PROOF_LIFETIME_SECS};

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Response header carrying the server-issued nonce
const DPOP_NONCE_HEADER: &str = "DPoP-Nonce";

/// Request header carrying the proof
const DPOP_HEADER: &str = "DPoP";

/// Error code of a nonce challenge
const USE_DPOP_NONCE: &str = "use_dpop_nonce";

/// Error codes that mark the access token as dead
const SESSION_EXPIRED_ERRORS: &[&str] = &["InvalidToken", "ExpiredToken", "invalid_token"];

// ============================================================================
// Wire types
// ============================================================================

/// XRPC error body: `{"error": "...", "message": "..."}`
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Characters of a non-JSON error body kept as the message
const RAW_BODY_LIMIT: usize = 512;

impl ErrorBody {
    /// Parses an XRPC error body, keeping other bodies as raw text
    fn parse(bytes: &[u8]) -> Self {
        if let Ok(body) = serde_json::from_slice(bytes) {
            return body;
        }
        let text = String::from_utf8_lossy(bytes);
        let text = text.trim();
        if text.is_empty() {
            return Self::default();
        }
        Self {
            error: None,
            message: Some(text.chars().take(RAW_BODY_LIMIT).collect()),
        }
    }
}

// ============================================================================
// Call state machine
// ============================================================================

/// Progress of one logical call
#[derive(Debug)]
enum CallState {
    Unsigned,
    SignedNoNonce { proof: String },
    SignedWithNonce { proof: String },
    Succeeded(Value),
    Failed(RepositoryError),
}

impl CallState {
    fn name(&self) -> &'static str {
        match self {
            CallState::Unsigned => "unsigned",
            CallState::SignedNoNonce { .. } => "signed_no_nonce",
            CallState::SignedWithNonce { .. } => "signed_with_nonce",
            CallState::Succeeded(_) => "succeeded",
            CallState::Failed(_) => "failed",
        }
    }
}

/// What a single HTTP attempt produced
#[derive(Debug)]
enum AttemptOutcome {
    Success(Value),
    /// Nonce challenge; `error` is what to surface if no retry is left
    Challenge {
        nonce: String,
        error: RepositoryError,
    },
    Failure(RepositoryError),
}

// ============================================================================
// RepositoryClient
// ============================================================================

/// HTTP client for authenticated repository calls
#[derive(Debug, Clone)]
pub struct RepositoryClient {
    client: Client,
    proof_lifetime_secs: i64,
}

impl Default for RepositoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RepositoryClient {
    /// Creates a client with the default timeout and proof lifetime
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_TIMEOUT, DEFAULT_PROOF_LIFETIME_SECS)
    }

    /// Creates a client with explicit settings
    ///
    /// # Arguments
    /// * `timeout` - Per-request timeout
    /// * `proof_lifetime_secs` - Validity window of each signed proof
    pub fn with_settings(timeout: Duration, proof_lifetime_secs: i64) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build configured HTTP client, using defaults");
                Client::new()
            });
        Self {
            client,
            proof_lifetime_secs,
        }
    }

    /// Performs one XRPC call, absorbing at most one nonce challenge
    ///
    /// # Arguments
    /// * `session` - Session supplying the repository URL, token and key
    /// * `method` - HTTP method
    /// * `nsid` - XRPC method id, e.g. `com.atproto.repo.putRecord`
    /// * `body` - JSON body, if any
    ///
    /// # Returns
    /// The parsed JSON response, or `Value::Null` for an empty success body
    #[instrument(skip(self, session, body), fields(did = %session.did))]
    pub async fn execute(
        &self,
        session: &Session,
        method: Method,
        nsid: &str,
        body: Option<&Value>,
    ) -> Result<Value, RepositoryError> {
        let url = format!("{}/xrpc/{}", session.base_url(), nsid);
        let key = DpopKey::from_material(&session.proof_key)
            .map_err(|e| RepositoryError::Proof(e.to_string()))?;
        let signer = DpopSigner::new(key).with_lifetime(self.proof_lifetime_secs);
        let sign = |nonce: Option<&str>| {
            signer
                .sign(method.as_str(), &url, nonce, Some(&session.access_token))
                .map_err(|e| RepositoryError::Proof(e.to_string()))
        };

        let mut state = CallState::Unsigned;
        loop {
            let previous = state.name();
            state = match state {
                CallState::Unsigned => match sign(None) {
                    Ok(proof) => CallState::SignedNoNonce { proof },
                    Err(e) => CallState::Failed(e),
                },
                CallState::SignedNoNonce { proof } => {
                    match self.attempt(session, &method, &url, &proof, body).await {
                        AttemptOutcome::Success(value) => CallState::Succeeded(value),
                        AttemptOutcome::Challenge { nonce, .. } => {
                            debug!(nsid, "Repository issued a nonce challenge, re-signing");
                            match sign(Some(&nonce)) {
                                Ok(proof) => CallState::SignedWithNonce { proof },
                                Err(e) => CallState::Failed(e),
                            }
                        }
                        AttemptOutcome::Failure(e) => CallState::Failed(e),
                    }
                }
                CallState::SignedWithNonce { proof } => {
                    match self.attempt(session, &method, &url, &proof, body).await {
                        AttemptOutcome::Success(value) => CallState::Succeeded(value),
                        AttemptOutcome::Challenge { error, .. } => {
                            warn!(nsid, "Repository challenged the nonce-bound retry");
                            CallState::Failed(error)
                        }
                        AttemptOutcome::Failure(e) => CallState::Failed(e),
                    }
                }
                CallState::Succeeded(value) => return Ok(value),
                CallState::Failed(e) => {
                    debug!(nsid, error = %e, "Repository call failed");
                    return Err(e);
                }
            };
            debug!(nsid, from = previous, to = state.name(), "Call state transition");
        }
    }

    /// Sends one signed HTTP attempt and interprets the response
    async fn attempt(
        &self,
        session: &Session,
        method: &Method,
        url: &str,
        proof: &str,
        body: Option<&Value>,
    ) -> AttemptOutcome {
        let mut request = self
            .client
            .request(method.clone(), url)
            .header(AUTHORIZATION, format!("DPoP {}", session.access_token))
            .header(DPOP_HEADER, proof);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return AttemptOutcome::Failure(RepositoryError::Network(e.to_string())),
        };

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return AttemptOutcome::Failure(RepositoryError::Network(e.to_string())),
        };

        if status.is_success() {
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return AttemptOutcome::Success(Value::Null);
            }
            return match serde_json::from_slice(&bytes) {
                Ok(value) => AttemptOutcome::Success(value),
                Err(e) => AttemptOutcome::Failure(RepositoryError::InvalidResponse(e.to_string())),
            };
        }

        let body = ErrorBody::parse(&bytes);
        classify_failure(status, &headers, body)
    }
}

/// Turns a non-success response into an attempt outcome
fn classify_failure(status: StatusCode, headers: &HeaderMap, body: ErrorBody) -> AttemptOutcome {
    let code = status.as_u16();

    if let Some(nonce) = challenge_nonce(status, headers, body.error.as_deref()) {
        return AttemptOutcome::Challenge {
            nonce,
            error: RepositoryError::Status {
                status: code,
                error: body.error,
                message: body.message,
            },
        };
    }

    if status == StatusCode::UNAUTHORIZED
        && body
            .error
            .as_deref()
            .is_some_and(|e| SESSION_EXPIRED_ERRORS.contains(&e))
    {
        return AttemptOutcome::Failure(RepositoryError::SessionExpired {
            status: code,
            error: body.error,
            message: body.message,
        });
    }

    AttemptOutcome::Failure(RepositoryError::Status {
        status: code,
        error: body.error,
        message: body.message,
    })
}

/// Returns the nonce if the response is a replay-protection challenge
///
/// Requires both the `use_dpop_nonce` marker (body or `WWW-Authenticate`)
/// and a `DPoP-Nonce` header.
fn challenge_nonce(status: StatusCode, headers: &HeaderMap, error: Option<&str>) -> Option<String> {
    if status != StatusCode::BAD_REQUEST && status != StatusCode::UNAUTHORIZED {
        return None;
    }
    let marked = error == Some(USE_DPOP_NONCE)
        || headers
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains(USE_DPOP_NONCE));
    if !marked {
        return None;
    }
    headers
        .get(DPOP_NONCE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
