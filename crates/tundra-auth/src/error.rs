/// Errors raised while authenticating or authorizing a request.
///
/// The display text of each variant is what clients receive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization header is required")]
    MissingHeader,

    #[error("Authorization header must be in format: Bearer <token>")]
    MalformedHeader,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("{message}")]
    Forbidden { message: String },
}

impl AuthError {
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn admin_required() -> Self {
        Self::forbidden("Admin access required")
    }

    /// Returns `true` for errors answered with 401.
    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Self::MissingHeader | Self::MalformedHeader | Self::InvalidToken
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            AuthError::MissingHeader.to_string(),
            "Authorization header is required"
        );
        assert_eq!(
            AuthError::MalformedHeader.to_string(),
            "Authorization header must be in format: Bearer <token>"
        );
        assert_eq!(AuthError::InvalidToken.to_string(), "Invalid or expired token");
        assert_eq!(AuthError::admin_required().to_string(), "Admin access required");
    }

    #[test]
    fn test_classification() {
        assert!(AuthError::InvalidToken.is_unauthenticated());
        assert!(AuthError::MissingHeader.is_unauthenticated());
        assert!(!AuthError::admin_required().is_unauthenticated());
    }
}
