//! # tundra-auth
//!
//! Authentication for the Tundra server.
//!
//! ## Modules
//!
//! - [`config`] - Token signing configuration
//! - [`jwt`] - HS256 token issuing and validation
//! - [`password`] - Argon2 password hashing
//! - [`middleware`] - axum extractors
//! - [`error`] - Authentication errors

pub mod config;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod password;

pub use config::AuthConfig;
pub use error::AuthError;
pub use jwt::{Claims, DEFAULT_ISSUER, DEFAULT_TOKEN_TTL, JwtError, JwtService};
pub use middleware::{AdminAuth, AuthState, AuthUser, BearerAuth};
pub use password::{hash_password, verify_password};
