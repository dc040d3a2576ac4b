//! JWT token signing and verification.
//!
//! [`TokenCodec`] owns the HS256 keys and a [`Clock`]. The secret is handed in
//! at construction; nothing here reads process environment.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::AuthError;
use crate::clock::Clock;
use crate::models::auth::{AccessClaims, RefreshClaims};
use crate::uuid::uuidv4;

/// Minimum secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Claims that carry an expiry timestamp.
pub trait Expiring {
    fn exp(&self) -> i64;
}

impl Expiring for AccessClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

impl Expiring for RefreshClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

/// Signs and verifies compact bearer tokens.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec. Fails with `SigningError` when the secret is shorter than
    /// [`MIN_SECRET_LEN`] bytes.
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::SigningError(format!(
                "secret must be at least {MIN_SECRET_LEN} bytes, got {}",
                secret.len()
            )));
        }

        // Expiry is checked against our own clock in `verify`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            clock,
        })
    }

    /// Sign arbitrary claims.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::SigningError(format!("jwt encode: {e}")))
    }

    /// Verify signature, shape and expiry. All-or-nothing: any failure is
    /// `InvalidToken`.
    pub fn verify<T: DeserializeOwned + Expiring>(&self, token: &str) -> Result<T, AuthError> {
        let claims = decode::<T>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?
            .claims;
        if self.clock.now().timestamp() >= claims.exp() {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Sign an access token for the given identity and session.
    pub fn sign_access(
        &self,
        user_id: &str,
        email: &str,
        role: &str,
        session_id: Option<&str>,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let now = self.clock.now();
        let claims = AccessClaims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            session_id: session_id.map(str::to_string),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        self.sign(&claims)
    }

    /// Sign a refresh token for the given user.
    pub fn sign_refresh(&self, user_id: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = self.clock.now();
        let claims = RefreshClaims {
            user_id: user_id.to_string(),
            jti: uuidv4().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        self.sign(&claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.verify(token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        self.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn codec() -> (TokenCodec, ManualClock) {
        let clock = ManualClock::starting_now();
        let codec = TokenCodec::new(SECRET, Arc::new(clock.clone())).unwrap();
        (codec, clock)
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = TokenCodec::new(b"too-short", Arc::new(ManualClock::starting_now()));
        assert!(matches!(err, Err(AuthError::SigningError(_))));
    }

    #[test]
    fn access_token_roundtrip() {
        let (codec, _) = codec();
        let token = codec
            .sign_access("u1", "a@x.com", "customer", Some("s1"), Duration::minutes(15))
            .unwrap();
        let claims = codec.verify_access(&token).unwrap();
        assert_eq!(claims.user_id, "u1");
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.role, "customer");
        assert_eq!(claims.session_id.as_deref(), Some("s1"));
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn token_valid_until_exp() {
        let (codec, clock) = codec();
        let token = codec
            .sign_access("u1", "a@x.com", "customer", None, Duration::minutes(15))
            .unwrap();
        clock.advance(Duration::minutes(15) - Duration::seconds(1));
        assert!(codec.verify_access(&token).is_ok());
        clock.advance(Duration::seconds(1));
        assert!(matches!(
            codec.verify_access(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn any_single_bit_flip_invalidates() {
        let (codec, _) = codec();
        let token = codec
            .sign_access("u1", "a@x.com", "customer", Some("s1"), Duration::minutes(15))
            .unwrap();
        for i in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] ^= 0x01;
            let mutated = String::from_utf8(bytes).unwrap();
            assert!(
                codec.verify_access(&mutated).is_err(),
                "mutation at byte {i} still verified"
            );
        }
    }

    #[test]
    fn other_secret_rejects() {
        let (codec, clock) = codec();
        let other =
            TokenCodec::new(b"ffffffffffffffffffffffffffffffff", Arc::new(clock)).unwrap();
        let token = other.sign_refresh("u1", Duration::days(7)).unwrap();
        assert!(codec.verify_refresh(&token).is_err());
    }

    #[test]
    fn refresh_tokens_in_same_second_differ() {
        let (codec, _) = codec();
        let a = codec.sign_refresh("u1", Duration::days(7)).unwrap();
        let b = codec.sign_refresh("u1", Duration::days(7)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn token_kinds_are_not_interchangeable() {
        let (codec, _) = codec();
        let refresh = codec.sign_refresh("u1", Duration::days(7)).unwrap();
        assert!(codec.verify_access(&refresh).is_err());
        let access = codec
            .sign_access("u1", "a@x.com", "customer", None, Duration::minutes(15))
            .unwrap();
        assert!(codec.verify_refresh(&access).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let (codec, _) = codec();
        assert!(codec.verify_access("not.a.token").is_err());
        assert!(codec.verify_access("").is_err());
    }
}
