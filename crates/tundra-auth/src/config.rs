//! Authentication configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::jwt::{DEFAULT_ISSUER, DEFAULT_TOKEN_TTL};

/// Token signing settings.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// jwt_secret = "change-me"
/// issuer = "tundra"
/// token_ttl_secs = 86400
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HS256 secret. Required; the `JWT_SECRET` environment variable
    /// is used when this is empty.
    pub jwt_secret: String,

    /// Value of the `iss` claim, checked on every request.
    pub issuer: String,

    /// Token lifetime in seconds.
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: DEFAULT_ISSUER.to_string(),
            token_ttl_secs: DEFAULT_TOKEN_TTL.as_secs(),
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.is_empty() {
            return Err("auth.jwt_secret (or JWT_SECRET) must be set".into());
        }
        if self.issuer.is_empty() {
            return Err("auth.issuer must not be empty".into());
        }
        if self.token_ttl_secs == 0 {
            return Err("auth.token_ttl_secs must be > 0".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AuthConfig::default();
        assert_eq!(cfg.issuer, "tundra");
        assert_eq!(cfg.token_ttl(), Duration::from_secs(86_400));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_with_secret() {
        let cfg = AuthConfig {
            jwt_secret: "s3cret".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());

        let cfg = AuthConfig {
            token_ttl_secs: 0,
            ..cfg
        };
        assert!(cfg.validate().is_err());
    }
}
