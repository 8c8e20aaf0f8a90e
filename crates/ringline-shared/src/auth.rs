//! Bearer tokens presented at the WebSocket handshake.
//!
//! The identity provider signs `user_id || display_name || expires_at`
//! with its Ed25519 key and hands the token to the client; the signaling
//! server only ever verifies. Token creation lives here too so tests and
//! provider tooling agree on the payload format.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::types::UserId;

/// Token signed by the identity provider, presented by the client at
/// handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub user_id: UserId,
    pub display_name: String,
    pub expires_at: DateTime<Utc>,
    pub signature: Vec<u8>,
}

fn signing_payload(user_id: &UserId, display_name: &str, expires_at: &DateTime<Utc>) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(user_id.as_str().as_bytes());
    payload.push(0);
    payload.extend_from_slice(display_name.as_bytes());
    payload.push(0);
    payload.extend_from_slice(expires_at.to_rfc3339().as_bytes());
    payload
}

/// Verify a token against the identity provider's public key.
pub fn verify_auth_token(token: &AuthToken, provider_pubkey: &[u8; 32]) -> Result<(), AuthError> {
    if Utc::now() > token.expires_at {
        return Err(AuthError::Expired);
    }

    let verifying_key =
        VerifyingKey::from_bytes(provider_pubkey).map_err(|_| AuthError::InvalidSignature)?;

    let signature =
        Signature::from_slice(&token.signature).map_err(|_| AuthError::InvalidSignature)?;

    let payload = signing_payload(&token.user_id, &token.display_name, &token.expires_at);
    verifying_key
        .verify(&payload, &signature)
        .map_err(|_| AuthError::InvalidSignature)
}

/// Sign a token. Used by the identity provider and by tests.
pub fn create_auth_token(
    user_id: UserId,
    display_name: impl Into<String>,
    expires_at: DateTime<Utc>,
    provider_signing_key: &ed25519_dalek::SigningKey,
) -> AuthToken {
    use ed25519_dalek::Signer;

    let display_name = display_name.into();
    let payload = signing_payload(&user_id, &display_name, &expires_at);
    let signature = provider_signing_key.sign(&payload);

    AuthToken {
        user_id,
        display_name,
        expires_at,
        signature: signature.to_bytes().to_vec(),
    }
}

impl AuthToken {
    /// Encode for the `?token=` query parameter: url-safe base64 over JSON.
    pub fn encode(&self) -> Result<String, AuthError> {
        let json = serde_json::to_vec(self).map_err(|_| AuthError::Malformed)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(encoded: &str) -> Result<Self, AuthError> {
        let json = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| AuthError::Malformed)?;
        serde_json::from_slice(&json).map_err(|_| AuthError::Malformed)
    }
}
