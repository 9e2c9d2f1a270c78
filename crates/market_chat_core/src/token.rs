//! crates/market_chat_core/src/token.rs
//!
//! Stateless bearer tokens. A token is an HS256-signed JWT carrying the
//! subject email, role, issue time and expiry. Nothing is stored server-side:
//! a token is valid until it expires.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::{Identity, Role};

/// Why a presented token was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Unparseable, signed with another key, or tampered with.
    #[error("Malformed token")]
    Malformed,
    #[error("Expired token")]
    Expired,
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to sign token: {0}")]
pub struct TokenIssueError(#[from] jsonwebtoken::errors::Error);

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    iat: i64,
    exp: i64,
}

/// A freshly signed token together with its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Creates and verifies signed tokens with a process-wide secret.
///
/// Holds no mutable state, so one instance can be shared across all requests.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by hand against an explicit instant.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, subject: &str, role: Role) -> Result<IssuedToken, TokenIssueError> {
        self.issue_at(subject, role, Utc::now())
    }

    /// Issues a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        subject: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenIssueError> {
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: subject.to_string(),
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(IssuedToken { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        self.verify_at(token, Utc::now())
    }

    /// Verifies signature and expiry as of `now`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AuthError::Malformed)?;
        let claims = data.claims;

        if claims.exp < now.timestamp() {
            return Err(AuthError::Expired);
        }
        if claims.sub.trim().is_empty() {
            return Err(AuthError::Malformed);
        }

        Ok(Identity::new(&claims.sub, claims.role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(b"test-secret-for-unit-tests", Duration::hours(1))
    }

    #[test]
    fn verify_returns_the_issued_identity() {
        let codec = codec();
        for role in [Role::User, Role::Showroom, Role::Admin] {
            let issued = codec.issue(" Buyer@X.com ", role).unwrap();
            let identity = codec.verify(&issued.token).unwrap();
            assert_eq!(identity, Identity::new("buyer@x.com", role));
        }
    }

    #[test]
    fn tampered_signature_is_malformed() {
        let codec = codec();
        let issued = codec.issue("b@x.com", Role::User).unwrap();

        let sig_start = issued.token.rfind('.').unwrap() + 1;
        let mut bytes = issued.token.into_bytes();
        bytes[sig_start] = if bytes[sig_start] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert_eq!(codec.verify(&tampered), Err(AuthError::Malformed));
    }

    #[test]
    fn token_from_another_secret_is_malformed() {
        let other = TokenCodec::new(b"some-other-secret", Duration::hours(1));
        let issued = other.issue("b@x.com", Role::User).unwrap();
        assert_eq!(codec().verify(&issued.token), Err(AuthError::Malformed));
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(codec().verify("not-a-token"), Err(AuthError::Malformed));
        assert_eq!(codec().verify(""), Err(AuthError::Malformed));
    }

    #[test]
    fn token_checked_after_expiry_is_expired() {
        let codec = codec();
        let issued = codec.issue("b@x.com", Role::User).unwrap();

        let later = issued.expires_at + Duration::seconds(1);
        assert_eq!(codec.verify_at(&issued.token, later), Err(AuthError::Expired));
        assert!(codec.verify_at(&issued.token, issued.expires_at).is_ok());
    }

    #[test]
    fn token_issued_in_the_past_expires() {
        let codec = codec();
        let issued = codec
            .issue_at("b@x.com", Role::User, Utc::now() - Duration::hours(2))
            .unwrap();
        assert_eq!(codec.verify(&issued.token), Err(AuthError::Expired));
    }
}
