//! Proof-of-possession (DPoP) signing
//!
//! Every request to the repository carries a short-lived JWT signed with
//! the session's Ed25519 key. The proof binds:
//!
//! - the HTTP method (`htm`) and target URL without query or fragment (`htu`)
//! - an issue time (`iat`) and expiry (`exp`)
//! - a fresh unique id (`jti`) so no two proofs are byte-identical
//! - the server-issued nonce, when one has been supplied
//! - the SHA-256 of the access token (`ath`), when one is presented
//!
//! A proof is produced for exactly one HTTP attempt. The nonce-challenge
//! resend in [`crate::client`] signs a brand-new proof.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use feedvault_core::domain::ProofKeyMaterial;

/// Default lifetime of a proof, in seconds
pub const DEFAULT_PROOF_LIFETIME_SECS: i64 = 60;

/// Errors that can occur while producing a proof
#[derive(Debug, Error)]
pub enum DpopError {
    /// The stored key seed is not valid base64
    #[error("failed to decode proof key seed: {0}")]
    InvalidSeedEncoding(#[from] base64::DecodeError),

    /// The decoded key seed has the wrong length
    #[error("proof key seed must be 32 bytes, got {0}")]
    InvalidSeedLength(usize),

    /// The target URL cannot be parsed
    #[error("invalid target URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Header or claims could not be serialized
    #[error("failed to encode proof: {0}")]
    Encoding(#[from] serde_json::Error),
}

// ============================================================================
// Key
// ============================================================================

/// Ed25519 key the session's tokens are bound to
#[derive(Clone)]
pub struct DpopKey {
    signing_key: SigningKey,
}

impl DpopKey {
    /// Generates a fresh random key
    pub fn generate() -> Self {
        let seed: [u8; 32] = rand::random();
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Rebuilds the key from the seed stored in a session
    pub fn from_material(material: &ProofKeyMaterial) -> Result<Self, DpopError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(material.seed_b64())?;
        let len = bytes.len();
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| DpopError::InvalidSeedLength(len))?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Exports the seed for storage in a session record
    pub fn to_material(&self) -> ProofKeyMaterial {
        ProofKeyMaterial::new(
            base64::engine::general_purpose::STANDARD.encode(self.signing_key.to_bytes()),
        )
    }

    /// Public half of the key as a JWK
    pub fn public_jwk(&self) -> Jwk {
        Jwk {
            kty: "OKP".to_string(),
            crv: "Ed25519".to_string(),
            x: URL_SAFE_NO_PAD.encode(self.signing_key.verifying_key().as_bytes()),
        }
    }

    /// RFC 7638 thumbprint of the public JWK
    ///
    /// Authorization servers bind issued tokens to this value (`jkt`).
    pub fn thumbprint(&self) -> String {
        let jwk = self.public_jwk();
        // Required members only, lexicographic order, no whitespace.
        let canonical = format!(
            r#"{{"crv":"{}","kty":"{}","x":"{}"}}"#,
            jwk.crv, jwk.kty, jwk.x
        );
        URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
    }
}

impl std::fmt::Debug for DpopKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DpopKey")
            .field("jwk", &self.public_jwk())
            .finish()
    }
}

/// Public key in JWK form, embedded in every proof header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
}

// ============================================================================
// Proof structure
// ============================================================================

/// JOSE header of a proof
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofHeader {
    pub typ: String,
    pub alg: String,
    pub jwk: Jwk,
}

/// Claims of a proof
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofClaims {
    pub jti: String,
    pub htm: String,
    pub htu: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ath: Option<String>,
}

// ============================================================================
// Signer
// ============================================================================

/// Produces single-use proofs with one session key
#[derive(Debug, Clone)]
pub struct DpopSigner {
    key: DpopKey,
    lifetime_secs: i64,
}

impl DpopSigner {
    pub fn new(key: DpopKey) -> Self {
        Self {
            key,
            lifetime_secs: DEFAULT_PROOF_LIFETIME_SECS,
        }
    }

    /// Sets how long each proof stays valid
    pub fn with_lifetime(mut self, lifetime_secs: i64) -> Self {
        self.lifetime_secs = lifetime_secs;
        self
    }

    pub fn key(&self) -> &DpopKey {
        &self.key
    }

    /// Signs a proof for one HTTP attempt
    ///
    /// # Arguments
    /// * `method` - HTTP method of the request
    /// * `url` - Full target URL; query and fragment are stripped
    /// * `nonce` - Server-issued nonce from a previous challenge, if any
    /// * `access_token` - Token presented in `Authorization`, if any
    ///
    /// # Returns
    /// The compact serialization `header.claims.signature`
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        nonce: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<String, DpopError> {
        let iat = Utc::now().timestamp();
        let claims = ProofClaims {
            jti: Uuid::new_v4().to_string(),
            htm: method.to_ascii_uppercase(),
            htu: target_uri(url)?,
            iat,
            exp: iat.saturating_add(self.lifetime_secs),
            nonce: nonce.map(str::to_string),
            ath: access_token.map(access_token_hash),
        };
        let header = ProofHeader {
            typ: "dpop+jwt".to_string(),
            alg: "EdDSA".to_string(),
            jwk: self.key.public_jwk(),
        };

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );
        let signature = self.key.signing_key.sign(signing_input.as_bytes());
        Ok(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }
}

/// `htu` value for a URL: scheme, host, port and path only
fn target_uri(url: &str) -> Result<String, DpopError> {
    let mut parsed = Url::parse(url).map_err(|e| DpopError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    parsed.set_query(None);
    parsed.set_fragment(None);
    Ok(parsed.to_string())
}

/// `ath` value: base64url(SHA-256(token))
pub fn access_token_hash(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}
