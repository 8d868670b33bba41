use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Serialize;
use tundra_db_postgres::DatabaseHealth;

use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    #[serde(flatten)]
    pub database: DatabaseHealth,
    /// `local` or `redis`
    pub cache_mode: &'static str,
    /// `available` or `unavailable`
    pub image_service: &'static str,
}

/// `GET /health`: database ping and pool statistics, 503 when the
/// database is down.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.store.health().await;
    let status = if database.is_up() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ServiceHealth {
        database,
        cache_mode: state.products_cache.backend().stats().mode,
        image_service: if state.images.is_some() {
            "available"
        } else {
            "unavailable"
        },
    };
    (status, Json(body))
}

/// `GET /healthz`: liveness only.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /metrics`: Prometheus text format.
pub async fn metrics() -> impl IntoResponse {
    match crate::metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
    }
}
