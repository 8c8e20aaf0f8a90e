//! Handshake authentication.
//!
//! Verifies the bearer token presented in the `?token=` query parameter
//! against the identity provider's Ed25519 public key. Verification
//! happens before any server-side state is created for the connection.

use ringline_shared::auth::{verify_auth_token, AuthToken};
use ringline_shared::error::AuthError;
use ringline_shared::types::UserId;
use tracing::debug;

/// The identity a connection was authenticated as.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: UserId,
    pub display_name: String,
}

/// Verifies handshake credentials against the provider public key.
#[derive(Clone)]
pub struct Authenticator {
    provider_pubkey: [u8; 32],
}

impl Authenticator {
    pub fn new(provider_pubkey: [u8; 32]) -> Self {
        Self { provider_pubkey }
    }

    /// Decode and verify an encoded bearer token.
    pub fn authenticate(&self, encoded: &str) -> Result<AuthContext, AuthError> {
        let token = AuthToken::decode(encoded)?;
        verify_auth_token(&token, &self.provider_pubkey)?;

        debug!(user = %token.user_id.short(), "Handshake authenticated");

        Ok(AuthContext {
            user_id: token.user_id,
            display_name: token.display_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use ringline_shared::auth::create_auth_token;

    #[test]
    fn test_authenticate_valid_token() {
        let provider_key = SigningKey::generate(&mut OsRng);
        let authenticator = Authenticator::new(provider_key.verifying_key().to_bytes());

        let token = create_auth_token(
            UserId::new("u-alice"),
            "Alice",
            Utc::now() + Duration::hours(1),
            &provider_key,
        );

        let ctx = authenticator.authenticate(&token.encode().unwrap()).unwrap();
        assert_eq!(ctx.user_id, UserId::new("u-alice"));
        assert_eq!(ctx.display_name, "Alice");
    }

    #[test]
    fn test_authenticate_garbage_is_refused() {
        let authenticator = Authenticator::new([0u8; 32]);
        assert!(authenticator.authenticate("not-a-token").is_err());
    }

    #[test]
    fn test_authenticate_wrong_key_is_refused() {
        let provider_key = SigningKey::generate(&mut OsRng);
        let other_key = SigningKey::generate(&mut OsRng);
        let authenticator = Authenticator::new(other_key.verifying_key().to_bytes());

        let token = create_auth_token(
            UserId::new("u-alice"),
            "Alice",
            Utc::now() + Duration::hours(1),
            &provider_key,
        );

        assert!(authenticator.authenticate(&token.encode().unwrap()).is_err());
    }
}
