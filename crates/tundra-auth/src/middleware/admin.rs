//! Admin authorization.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::post};
//! use tundra_auth::middleware::AdminAuth;
//!
//! async fn create(AdminAuth(admin): AdminAuth) -> String {
//!     format!("Hello admin: {}!", admin.username)
//! }
//!
//! let app = Router::new()
//!     .route("/products", post(create))
//!     .with_state(auth_state);
//! ```

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::error::AuthError;

use super::auth::{AuthState, AuthUser, BearerAuth};

// =============================================================================
// Admin Auth Extractor
// =============================================================================

/// Extractor that requires a valid token whose role is `admin`.
#[derive(Debug, Clone)]
pub struct AdminAuth(pub AuthUser);

impl<S> FromRequestParts<S> for AdminAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerAuth(user) = BearerAuth::from_request_parts(parts, state).await?;
        ensure_admin(&user)?;
        Ok(Self(user))
    }
}

fn ensure_admin(user: &AuthUser) -> Result<(), AuthError> {
    if !user.is_admin() {
        tracing::debug!(
            user_id = %user.user_id,
            username = %user.username,
            role = %user.role,
            "Admin access denied: missing admin role"
        );
        return Err(AuthError::admin_required());
    }

    tracing::debug!(
        user_id = %user.user_id,
        username = %user.username,
        "Admin access granted"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tundra_core::Role;
    use uuid::Uuid;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            username: "admin_user".into(),
            email: "admin@example.com".into(),
            role,
        }
    }

    #[test]
    fn test_ensure_admin() {
        assert!(ensure_admin(&user(Role::Admin)).is_ok());
        assert_eq!(
            ensure_admin(&user(Role::User)),
            Err(AuthError::admin_required())
        );
    }
}
