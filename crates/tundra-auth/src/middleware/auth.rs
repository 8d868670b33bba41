//! Bearer token authentication.
//!
//! `BearerAuth` stores the resolved [`AuthUser`] in the request extensions,
//! so a second extractor on the same request (`AdminAuth` builds on it) does
//! not decode the token again.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use tundra_auth::middleware::{AuthState, BearerAuth};
//!
//! async fn me(BearerAuth(user): BearerAuth) -> String {
//!     format!("Hello, {}!", user.username)
//! }
//!
//! let app = Router::new()
//!     .route("/me", get(me))
//!     .with_state(auth_state);
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use tundra_core::Role;
use uuid::Uuid;

use crate::error::AuthError;
use crate::jwt::{Claims, JwtService};

// =============================================================================
// Auth State
// =============================================================================

/// State required for bearer token authentication, made available to the
/// extractors via `FromRef`.
#[derive(Clone, Debug)]
pub struct AuthState {
    pub jwt_service: Arc<JwtService>,
}

impl AuthState {
    pub fn new(jwt_service: Arc<JwtService>) -> Self {
        Self { jwt_service }
    }
}

// =============================================================================
// Authenticated user
// =============================================================================

/// Identity carried by a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            username: claims.username,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// Pulls the token out of `Authorization: Bearer <token>`.
///
/// The header must split on single spaces into exactly the `Bearer` scheme and
/// one token.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::MissingHeader)?;
    let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;
    if value.is_empty() {
        return Err(AuthError::MissingHeader);
    }

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Validates the bearer token in `headers`.
pub fn authenticate(jwt: &JwtService, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
    let token = bearer_token(headers)?;
    let claims = jwt.decode(token).map_err(|e| {
        tracing::debug!(error = %e, "Token validation failed");
        AuthError::InvalidToken
    })?;
    Ok(AuthUser::from(claims))
}

// =============================================================================
// Bearer Auth Extractor
// =============================================================================

/// Axum extractor yielding the authenticated user.
///
/// # Errors
///
/// Rejects with `AuthError` (401) when the header is missing or malformed, or
/// when the token is invalid or expired.
pub struct BearerAuth(pub AuthUser);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(Self(user.clone()));
        }

        let auth_state = AuthState::from_ref(state);
        let user = authenticate(&auth_state.jwt_service, &parts.headers)?;
        parts.extensions.insert(user.clone());
        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")), Ok("abc.def.ghi"));
        assert_eq!(bearer_token(&HeaderMap::new()), Err(AuthError::MissingHeader));
        assert_eq!(
            bearer_token(&headers("Basic abc")),
            Err(AuthError::MalformedHeader)
        );
        assert_eq!(
            bearer_token(&headers("Bearer")),
            Err(AuthError::MalformedHeader)
        );
        assert_eq!(
            bearer_token(&headers("Bearer a b")),
            Err(AuthError::MalformedHeader)
        );
        assert_eq!(
            bearer_token(&headers("bearer abc")),
            Err(AuthError::MalformedHeader)
        );
    }

    #[test]
    fn test_empty_token_is_invalid_not_malformed() {
        let jwt = JwtService::new("secret", "tundra", std::time::Duration::from_secs(60)).unwrap();
        assert_eq!(
            authenticate(&jwt, &headers("Bearer ")),
            Err(AuthError::InvalidToken)
        );
    }
}
