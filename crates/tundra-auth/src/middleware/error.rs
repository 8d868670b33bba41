//! Error responses for the authentication middleware.
//!
//! Every rejection is rendered as `{"error": "<message>"}`.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

impl AuthError {
    /// HTTP status this error is answered with.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingHeader | Self::MalformedHeader | Self::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let mut response = (status, Json(json!({ "error": self.to_string() }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
