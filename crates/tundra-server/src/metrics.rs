//! Prometheus metrics for the Tundra server.
//!
//! - HTTP request metrics (count, latency)
//! - Cache hit/miss counters
//! - Rate limit rejections per tier
//! - Order and image upload outcomes

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";

    pub const RATE_LIMIT_REJECTIONS_TOTAL: &str = "rate_limit_rejections_total";

    // Store metrics
    pub const ORDERS_PLACED_TOTAL: &str = "orders_placed_total";
    pub const ORDERS_FAILED_TOTAL: &str = "orders_failed_total";
    pub const IMAGE_UPLOADS_TOTAL: &str = "image_uploads_total";
}

/// Initialize the Prometheus recorder.
///
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }
            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// =============================================================================
// HTTP Metrics
// =============================================================================

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let status_class = match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    };
    let normalized_path = normalize_path(path);

    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "path" => normalized_path.clone(),
        "status" => status.to_string(),
        "status_class" => status_class
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "path" => normalized_path
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Cache Metrics
// =============================================================================

/// Record a cache hit on `l1` or `l2`.
pub fn record_cache_hit(tier: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "tier" => tier).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

pub fn record_rate_limit_rejection(tier: &str) {
    counter!(names::RATE_LIMIT_REJECTIONS_TOTAL, "tier" => tier.to_string()).increment(1);
}

// =============================================================================
// Store Metrics
// =============================================================================

pub fn record_order_placed() {
    counter!(names::ORDERS_PLACED_TOTAL).increment(1);
}

/// `reason` is one of `invalid_request`, `not_found`, `insufficient_stock`, `database`.
pub fn record_order_failed(reason: &'static str) {
    counter!(names::ORDERS_FAILED_TOTAL, "reason" => reason).increment(1);
}

/// `outcome` is `success` or `failure`.
pub fn record_image_upload(outcome: &'static str) {
    counter!(names::IMAGE_UPLOADS_TOTAL, "outcome" => outcome).increment(1);
}

// =============================================================================
// Helpers
// =============================================================================

/// Replaces IDs in a path with `{id}` to keep label cardinality bounded.
pub(crate) fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|part| if is_likely_id(part) { "{id}" } else { part })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_likely_id(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    if s.len() == 36 && s.chars().filter(|c| *c == '-').count() == 4 {
        return true;
    }
    if s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit()) {
        return true;
    }
    s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path("/products/550e8400-e29b-41d4-a716-446655440000"),
            "/products/{id}"
        );
        assert_eq!(
            normalize_path("/products/550e8400-e29b-41d4-a716-446655440000/image"),
            "/products/{id}/image"
        );
        assert_eq!(normalize_path("/orders/42"), "/orders/{id}");
        assert_eq!(normalize_path("/auth/login"), "/auth/login");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_is_likely_id() {
        assert!(is_likely_id("12345"));
        assert!(is_likely_id("550e8400e29b41d4a716446655440000"));
        assert!(!is_likely_id("products"));
        assert!(!is_likely_id(""));
    }
}
