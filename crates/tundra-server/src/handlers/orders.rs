//! Order placement and history for the authenticated user.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use tundra_api::ApiError;
use tundra_auth::BearerAuth;
use tundra_core::{Order, OrderItem, normalize_items};
use tundra_db_postgres::StorageError;
use tundra_db_postgres::order::ORDER_NOT_FOUND;

use super::parse_id;
use crate::server::AppState;

/// `POST /orders`
///
/// Stock is checked and deducted in one transaction; any failure leaves
/// every product untouched.
pub async fn create_order(
    BearerAuth(user): BearerAuth,
    State(state): State<AppState>,
    body: Result<Json<Vec<OrderItem>>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let Json(items) = body.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "Rejected order body");
        ApiError::bad_request("Invalid request body")
    })?;
    let lines = normalize_items(&items).inspect_err(|_| {
        crate::metrics::record_order_failed("invalid_request");
    })?;

    let order = match state.store.orders().place_order(user.user_id, &lines).await {
        Ok(order) => order,
        Err(e) => {
            crate::metrics::record_order_failed(failure_reason(&e));
            tracing::info!(user_id = %user.user_id, error = %e, "Order rejected");
            return Err(e.into());
        }
    };

    crate::metrics::record_order_placed();
    tracing::info!(
        order_id = %order.id,
        user_id = %user.user_id,
        lines = order.order_products.len(),
        total_price = order.total_price,
        "Order placed"
    );
    // Stock levels shown in cached listings are now stale.
    state.products_cache.invalidate_all().await;

    Ok((StatusCode::CREATED, Json(order)))
}

fn failure_reason(e: &StorageError) -> &'static str {
    match e {
        StorageError::NotFound(_) => "not_found",
        StorageError::InsufficientStock { .. } => "insufficient_stock",
        StorageError::Conflict(_) | StorageError::InvalidInput(_) => "invalid_request",
        StorageError::Database(_) => "database",
    }
}

/// `GET /orders`
pub async fn list_orders(
    BearerAuth(user): BearerAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = state.store.orders().list_for_user(user.user_id).await?;
    Ok(Json(orders))
}

/// `GET /orders/{id}`
pub async fn get_order(
    BearerAuth(user): BearerAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_id(&id, ORDER_NOT_FOUND)?;
    let order = state
        .store
        .orders()
        .find_for_user(user.user_id, order_id)
        .await?;
    Ok(Json(order))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason() {
        assert_eq!(failure_reason(&StorageError::not_found("x")), "not_found");
        assert_eq!(
            failure_reason(&StorageError::insufficient_stock("Lamp", 1, 2)),
            "insufficient_stock"
        );
        assert_eq!(
            failure_reason(&StorageError::Database(sqlx_core::Error::PoolTimedOut)),
            "database"
        );
    }
}
