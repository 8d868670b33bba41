//! HS256 session tokens.
//!
//! Tokens are self-contained: the middleware trusts the claims once the
//! signature, issuer and expiry check out, without a database lookup.

use std::time::Duration;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tundra_core::{Role, User};
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to encode token: {message}")]
    EncodingError { message: String },

    #[error("Failed to decode token: {message}")]
    DecodingError { message: String },

    #[error("Token expired")]
    Expired,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid claims: {message}")]
    InvalidClaims { message: String },

    #[error("Invalid key: {message}")]
    InvalidKey { message: String },
}

impl JwtError {
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a validation error (expired, invalid signature, etc.).
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::InvalidSignature | Self::InvalidClaims { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidIssuer | ErrorKind::ImmatureSignature | ErrorKind::MissingRequiredClaim(_) => {
                Self::invalid_claims(err.to_string())
            }
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

// ============================================================================
// Claims
// ============================================================================

/// Claims carried by a login token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

// ============================================================================
// JWT Service
// ============================================================================

pub const DEFAULT_ISSUER: &str = "tundra";
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    /// Creates a service signing with the shared `secret`.
    ///
    /// # Errors
    /// Returns `InvalidKey` for an empty secret.
    pub fn new(secret: &str, issuer: impl Into<String>, ttl: Duration) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::invalid_key("JWT secret must not be empty"));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            ttl,
        })
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Builds claims for `user`, valid from now for the configured lifetime.
    #[must_use]
    pub fn claims_for(&self, user: &User) -> Claims {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Claims {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.ttl.as_secs() as i64,
        }
    }

    /// Issues a signed token for `user`.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn issue(&self, user: &User) -> Result<String, JwtError> {
        self.encode(&self.claims_for(user))
    }

    /// # Errors
    /// Returns an error if encoding fails.
    pub fn encode(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Decodes and validates signature, issuer and expiry.
    ///
    /// # Errors
    /// Returns an error if decoding or validation fails.
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = true;
        validation.validate_aud = false;

        let data: TokenData<Claims> = decode(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            username: "john123".into(),
            email: "john@example.com".into(),
            password_hash: String::new(),
            role,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn service() -> JwtService {
        JwtService::new("test-secret", DEFAULT_ISSUER, DEFAULT_TOKEN_TTL).unwrap()
    }

    #[test]
    fn test_issue_and_decode() {
        let service = service();
        let user = user(Role::Admin);
        let token = service.issue(&user).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = service.decode(&token).unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.username, "john123");
        assert_eq!(claims.email, "john@example.com");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.iss, "tundra");
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
        assert!(claims.is_admin());
    }

    #[test]
    fn test_empty_secret_rejected() {
        let err = JwtService::new("", DEFAULT_ISSUER, DEFAULT_TOKEN_TTL).unwrap_err();
        assert!(matches!(err, JwtError::InvalidKey { .. }));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let token = service().issue(&user(Role::User)).unwrap();
        let other = JwtService::new("other-secret", DEFAULT_ISSUER, DEFAULT_TOKEN_TTL).unwrap();
        let err = other.decode(&token).unwrap_err();
        assert!(matches!(err, JwtError::InvalidSignature));
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_expired_token_fails() {
        let service = service();
        let mut claims = service.claims_for(&user(Role::User));
        claims.iat -= 3 * 3600;
        claims.exp = claims.iat + 3600;
        let token = service.encode(&claims).unwrap();
        assert!(matches!(service.decode(&token), Err(JwtError::Expired)));
    }

    #[test]
    fn test_wrong_issuer_fails() {
        let token = JwtService::new("test-secret", "someone-else", DEFAULT_TOKEN_TTL)
            .unwrap()
            .issue(&user(Role::User))
            .unwrap();
        let err = service().decode(&token).unwrap_err();
        assert!(matches!(err, JwtError::InvalidClaims { .. }));
    }

    #[test]
    fn test_garbage_token_fails() {
        let err = service().decode("not.a.token").unwrap_err();
        assert!(!matches!(err, JwtError::Expired));
    }
}
