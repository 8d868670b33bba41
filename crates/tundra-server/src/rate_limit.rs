//! Per-IP rate limiting with governor token buckets.
//!
//! Each tier owns one bucket per client address. A bucket holds `N` tokens
//! and refills `N` per period, so a spec of `5-M` allows a burst of five
//! requests and then one more every twelve seconds.

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State, connect_info::MockConnectInfo},
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    middleware::StateInformationMiddleware,
    state::{InMemoryState, NotKeyed},
};
use serde_json::json;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::RateLimitConfig;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateSpecError {
    #[error("rate spec is empty")]
    Empty,
    #[error("rate spec '{0}' must look like N-S, N-M or N-H")]
    Malformed(String),
    #[error("rate spec count '{0}' is not a positive integer")]
    InvalidCount(String),
    #[error("rate spec unit '{0}' must be S, M or H")]
    UnknownUnit(String),
}

/// `N` requests per second, minute or hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSpec {
    pub count: NonZeroU32,
    pub period: Duration,
}

impl RateSpec {
    pub fn new(count: NonZeroU32, period: Duration) -> Self {
        Self { count, period }
    }

    /// Burst of `count`, replenishing `count` cells per `period`.
    pub fn quota(&self) -> Quota {
        Quota::with_period(self.period / self.count.get())
            .map(|q| q.allow_burst(self.count))
            .unwrap_or_else(|| Quota::per_second(self.count))
    }

    /// Time for one token to come back.
    pub fn replenish_interval(&self) -> Duration {
        self.period / self.count.get()
    }
}

impl FromStr for RateSpec {
    type Err = RateSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RateSpecError::Empty);
        }
        let (count, unit) = s
            .split_once('-')
            .ok_or_else(|| RateSpecError::Malformed(s.to_string()))?;
        let count = count
            .trim()
            .parse::<u32>()
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| RateSpecError::InvalidCount(count.to_string()))?;
        let period = match unit.trim() {
            "S" | "s" => Duration::from_secs(1),
            "M" | "m" => Duration::from_secs(60),
            "H" | "h" => Duration::from_secs(3600),
            other => return Err(RateSpecError::UnknownUnit(other.to_string())),
        };
        Ok(Self { count, period })
    }
}

impl fmt::Display for RateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.period.as_secs() {
            1 => "S",
            60 => "M",
            3600 => "H",
            _ => return write!(f, "{}/{}s", self.count, self.period.as_secs_f64()),
        };
        write!(f, "{}-{unit}", self.count)
    }
}

type DirectLimiter =
    RateLimiter<NotKeyed, InMemoryState, DefaultClock, StateInformationMiddleware>;

struct Bucket {
    limiter: DirectLimiter,
    last_access: Instant,
}

impl Bucket {
    fn new(quota: Quota) -> Self {
        Self {
            limiter: RateLimiter::direct(quota).with_middleware::<StateInformationMiddleware>(),
            last_access: Instant::now(),
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Unix timestamp (seconds) `after` from now, rounded up.
fn reset_header(after: Duration) -> HeaderValue {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let after = i64::try_from(ceil_secs(after)).unwrap_or(i64::MAX);
    HeaderValue::from(now.saturating_add(after))
}

/// Quota state reported on allowed responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateInfo {
    pub limit: u32,
    pub remaining: u32,
    /// Until the bucket is full again
    pub reset_after: Duration,
}

impl RateInfo {
    /// Sets the rate limit headers unless an inner tier already did.
    pub fn apply(&self, headers: &mut HeaderMap) {
        if !headers.contains_key(&X_RATELIMIT_LIMIT) {
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
            headers.insert(X_RATELIMIT_RESET, reset_header(self.reset_after));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denied {
    pub limit: u32,
    pub retry_after: Duration,
    /// Until the bucket is full again
    pub reset_after: Duration,
}

impl Denied {
    /// Whole seconds until a token is available, rounded up, at least 1.
    pub fn retry_after_secs(&self) -> u64 {
        ceil_secs(self.retry_after).max(1)
    }
}

impl IntoResponse for Denied {
    fn into_response(self) -> Response {
        let body = json!({
            "error": "Too many requests",
            "message": "Rate limit exceeded. Please try again later.",
        });
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert(header::RETRY_AFTER, HeaderValue::from(self.retry_after_secs()));
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
        headers.insert(X_RATELIMIT_RESET, reset_header(self.reset_after));
        response
    }
}

/// One named tier: a token bucket per client address.
pub struct TierLimiter {
    name: &'static str,
    spec: RateSpec,
    quota: Quota,
    trust_forwarded_for: bool,
    buckets: DashMap<IpAddr, Bucket>,
}

impl fmt::Debug for TierLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TierLimiter")
            .field("name", &self.name)
            .field("spec", &self.spec.to_string())
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

impl TierLimiter {
    pub fn new(name: &'static str, spec: RateSpec) -> Self {
        Self {
            name,
            spec,
            quota: spec.quota(),
            trust_forwarded_for: false,
            buckets: DashMap::new(),
        }
    }

    pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn spec(&self) -> RateSpec {
        self.spec
    }

    pub fn check(&self, ip: IpAddr) -> Result<RateInfo, Denied> {
        let limit = self.spec.count.get();
        let mut bucket = self.buckets.entry(ip).or_insert_with(|| {
            tracing::debug!(tier = self.name, ip = %ip, "Creating new rate limit bucket");
            Bucket::new(self.quota)
        });
        bucket.last_access = Instant::now();

        let interval = self.spec.replenish_interval();
        match bucket.limiter.check() {
            Ok(snapshot) => {
                let remaining = snapshot.remaining_burst_capacity();
                Ok(RateInfo {
                    limit,
                    remaining,
                    reset_after: interval * limit.saturating_sub(remaining),
                })
            }
            Err(not_until) => {
                let retry_after = not_until.wait_time_from(DefaultClock::default().now());
                Err(Denied {
                    limit,
                    retry_after,
                    reset_after: retry_after + interval * (limit - 1),
                })
            }
        }
    }

    /// Drop buckets idle for longer than `max_age`.
    pub fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.buckets.retain(|ip, bucket| {
            let age = now.duration_since(bucket.last_access);
            if age > max_age {
                tracing::debug!(tier = self.name, ip = %ip, age_secs = age.as_secs(), "Removing stale rate limit bucket");
                false
            } else {
                true
            }
        });
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

/// The three independent tiers.
#[derive(Debug, Clone)]
pub struct RateLimiters {
    /// Every route
    pub global: Arc<TierLimiter>,
    /// `/auth/*`
    pub auth: Arc<TierLimiter>,
    /// `/products*` and `/orders*`
    pub api: Arc<TierLimiter>,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, RateSpecError> {
        let tier = |name: &'static str, spec: &str| -> Result<Arc<TierLimiter>, RateSpecError> {
            Ok(Arc::new(
                TierLimiter::new(name, spec.parse()?)
                    .with_trust_forwarded_for(config.trust_forwarded_for),
            ))
        };
        Ok(Self {
            global: tier("global", &config.global)?,
            auth: tier("auth", &config.auth)?,
            api: tier("api", &config.api)?,
        })
    }

    pub fn tiers(&self) -> [&Arc<TierLimiter>; 3] {
        [&self.global, &self.auth, &self.api]
    }

    /// Periodically sweeps idle buckets from every tier.
    ///
    /// A bucket idle for a whole period is full again, so it is only removed
    /// once it has been idle for at least its tier's period.
    pub fn spawn_cleanup(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let limiters = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                for tier in limiters.tiers() {
                    tier.cleanup(tier.spec().period.max(interval));
                }
            }
        })
    }
}

/// Middleware enforcing one tier. Attach with
/// `middleware::from_fn_with_state(limiter, enforce)`.
pub async fn enforce(
    State(limiter): State<Arc<TierLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&req, limiter.trust_forwarded_for);
    match limiter.check(ip) {
        Ok(info) => {
            let mut response = next.run(req).await;
            info.apply(response.headers_mut());
            response
        }
        Err(denied) => {
            tracing::warn!(
                tier = limiter.name(),
                ip = %ip,
                path = %req.uri().path(),
                retry_after_secs = denied.retry_after_secs(),
                "Rate limit exceeded"
            );
            crate::metrics::record_rate_limit_rejection(limiter.name());
            denied.into_response()
        }
    }
}

/// Client address for rate limiting.
///
/// Forwarding headers are only consulted when `trust_forwarded` is set.
pub fn client_ip<B>(req: &Request<B>, trust_forwarded: bool) -> IpAddr {
    if trust_forwarded && let Some(ip) = forwarded_ip(req.headers()) {
        return ip;
    }
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip();
    }
    if let Some(MockConnectInfo(addr)) = req.extensions().get::<MockConnectInfo<SocketAddr>>() {
        return addr.ip();
    }
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let first_forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok());
    first_forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|ip| ip.trim().parse().ok())
    })
}
