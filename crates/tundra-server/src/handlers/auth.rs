//! Registration and login.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tundra_api::ApiError;
use tundra_auth::{hash_password, verify_password};
use tundra_core::{NewUser, Role, validate_email, validate_password, validate_username};
use tundra_db_postgres::StorageError;
use uuid::Uuid;

use crate::server::AppState;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user: RegisteredUser,
}

#[derive(Debug, Serialize)]
pub struct LoggedInUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub token: String,
    pub user: LoggedInUser,
}

/// `POST /auth/register`
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let req = match body {
        Ok(Json(req))
            if !req.username.is_empty() && !req.email.is_empty() && !req.password.is_empty() =>
        {
            req
        }
        _ => return Err(ApiError::bad_request("All fields are required")),
    };

    validate_username(&req.username)?;
    validate_email(&req.email)?;
    validate_password(&req.password)?;

    let users = state.store.users();
    if users.find_by_username(&req.username).await?.is_some() {
        return Err(ApiError::bad_request(tundra_db_postgres::user::USERNAME_TAKEN));
    }
    if users.find_by_email(&req.email).await?.is_some() {
        return Err(ApiError::bad_request(tundra_db_postgres::user::EMAIL_TAKEN));
    }

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::internal(format!("hashing task failed: {e}")))?
        .map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            ApiError::internal("Failed to process registration")
        })?;

    let user = users
        .create(NewUser {
            username: req.username,
            email: req.email,
            password_hash,
            role: Role::User,
        })
        .await
        .map_err(|e| match e {
            // A registration racing the checks above hits the unique constraint.
            StorageError::Conflict(message) => ApiError::bad_request(message),
            other => ApiError::from(other),
        })?;

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully",
            user: RegisteredUser {
                id: user.id,
                username: user.username,
                email: user.email,
            },
        }),
    ))
}

/// `POST /auth/login`
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let req = match body {
        Ok(Json(req)) if !req.email.is_empty() && !req.password.is_empty() => req,
        _ => return Err(ApiError::bad_request("Email and password are required")),
    };

    if validate_email(&req.email).is_err() {
        return Err(ApiError::bad_request("Invalid email format"));
    }

    let Some(user) = state.store.users().find_by_email(&req.email).await? else {
        tracing::debug!("Login attempt for unknown email");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };

    let password = req.password;
    let hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::internal(format!("verification task failed: {e}")))?;
    match verified {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(user_id = %user.id, "Login attempt with wrong password");
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Stored password hash is unreadable");
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }
    }

    let token = state.auth.jwt_service.issue(&user).map_err(|e| {
        tracing::error!(error = %e, "Token generation failed");
        ApiError::internal("Failed to generate authentication token")
    })?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        message: "Login successful",
        token,
        user: LoggedInUser {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
        },
    }))
}
