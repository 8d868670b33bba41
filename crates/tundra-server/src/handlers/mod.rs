//! HTTP handlers.
//!
//! Every handler returns `Result<_, ApiError>`, so failures are rendered as
//! `{"error": "..."}` with the matching status code.

pub mod auth;
pub mod health;
pub mod orders;
pub mod products;

pub use auth::{login, register};
pub use health::{health, healthz, metrics};
pub use orders::{create_order, get_order, list_orders};
pub use products::{create_product, delete_product, get_product, list_products, update_product, upload_product_image};

use tundra_api::ApiError;
use uuid::Uuid;

/// Parses a path id; anything that is not a UUID cannot exist.
pub(crate) fn parse_id(raw: &str, not_found: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::not_found(not_found))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string(), "missing").unwrap(), id);

        let err = parse_id("not-a-uuid", "Product not found").unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "Product not found");
    }
}
