//! HTTP middleware for authentication and authorization.
//!
//! - Bearer token extraction and validation
//! - Admin role checks
//! - JSON error responses
//!
//! Handlers opt in by taking `BearerAuth` or `AdminAuth` as an argument.

pub mod admin;
pub mod auth;
pub mod error;

pub use admin::AdminAuth;
pub use auth::{AuthState, AuthUser, BearerAuth, authenticate, bearer_token};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header::AUTHORIZATION},
        routing::get,
    };
    use time::OffsetDateTime;
    use tower::ServiceExt;
    use tundra_core::{Role, User};
    use uuid::Uuid;

    use super::*;
    use crate::jwt::JwtService;

    fn state() -> AuthState {
        AuthState::new(Arc::new(
            JwtService::new("middleware-secret", "tundra", Duration::from_secs(3600)).unwrap(),
        ))
    }

    fn token(state: &AuthState, role: Role) -> String {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: "jane_doe".into(),
            email: "jane@example.com".into(),
            password_hash: String::new(),
            role,
            created_at: now,
            updated_at: now,
        };
        state.jwt_service.issue(&user).unwrap()
    }

    async fn whoami(BearerAuth(user): BearerAuth) -> String {
        user.username
    }

    async fn admin_only(AdminAuth(user): AdminAuth) -> String {
        user.role.to_string()
    }

    fn extractor_app(state: AuthState) -> Router {
        Router::new()
            .route("/me", get(whoami))
            .route("/admin", get(admin_only))
            .with_state(state)
    }

    fn request(uri: &str, auth: Option<String>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_bearer_extractor() {
        let state = state();
        let app = extractor_app(state.clone());

        let ok = app
            .clone()
            .oneshot(request("/me", Some(format!("Bearer {}", token(&state, Role::User)))))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let missing = app.clone().oneshot(request("/me", None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let garbage = app
            .oneshot(request("/me", Some("Bearer nope".into())))
            .await
            .unwrap();
        assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_extractor() {
        let state = state();
        let app = extractor_app(state.clone());

        let anonymous = app.clone().oneshot(request("/admin", None)).await.unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let user = app
            .clone()
            .oneshot(request("/admin", Some(format!("Bearer {}", token(&state, Role::User)))))
            .await
            .unwrap();
        assert_eq!(user.status(), StatusCode::FORBIDDEN);

        let admin = app
            .oneshot(request("/admin", Some(format!("Bearer {}", token(&state, Role::Admin)))))
            .await
            .unwrap();
        assert_eq!(admin.status(), StatusCode::OK);
    }
}
