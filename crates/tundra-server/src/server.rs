use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    handler::Handler,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tundra_auth::{AuthState, JwtService};
use tundra_db_postgres::PostgresStore;

use crate::cache::{CacheBackend, ProductListCache};
use crate::config::AppConfig;
use crate::media::{CloudinaryClient, CloudinaryConfig, ImageStore};
use crate::rate_limit::{RateLimiters, TierLimiter, enforce};
use crate::{handlers, middleware as app_middleware};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: PostgresStore,
    pub products_cache: ProductListCache,
    /// `None` when no image host is configured.
    pub images: Option<Arc<dyn ImageStore>>,
    pub auth: AuthState,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: PostgresStore,
        cache: CacheBackend,
        images: Option<Arc<dyn ImageStore>>,
    ) -> anyhow::Result<Self> {
        let jwt = JwtService::new(
            &config.auth.jwt_secret,
            config.auth.issuer.clone(),
            config.auth.token_ttl(),
        )?;
        Ok(Self {
            store,
            products_cache: ProductListCache::new(cache, config.cache.product_list_ttl()),
            images,
            auth: AuthState::new(Arc::new(jwt)),
            config: Arc::new(config),
        })
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

fn rate_limited(router: Router<AppState>, tier: Option<&Arc<TierLimiter>>) -> Router<AppState> {
    match tier {
        Some(limiter) => router.route_layer(middleware::from_fn_with_state(limiter.clone(), enforce)),
        None => router,
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        // Credentials rule out a literal wildcard.
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect::<Vec<_>>(),
        )
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::PATCH,
        ])
        .allow_headers([header::ACCEPT, header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Builds the router. Without `limiters` no rate limiting is applied.
pub fn build_app(state: AppState, limiters: Option<&RateLimiters>) -> Router {
    let cfg = Arc::clone(&state.config);
    let upload_limit = DefaultBodyLimit::max(cfg.server.upload_limit_bytes);

    let auth_routes = Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login));

    let api_routes = Router::new()
        .route(
            "/products",
            get(handlers::list_products).post(handlers::create_product.layer(upload_limit)),
        )
        .route(
            "/products/{id}",
            get(handlers::get_product)
                .put(handlers::update_product)
                .delete(handlers::delete_product),
        )
        .route(
            "/products/{id}/image",
            post(handlers::upload_product_image.layer(upload_limit)),
        )
        .route(
            "/orders",
            get(handlers::list_orders).post(handlers::create_order),
        )
        .route("/orders/{id}", get(handlers::get_order));

    let app = Router::new()
        .merge(rate_limited(auth_routes, limiters.map(|l| &l.auth)))
        .merge(rate_limited(api_routes, limiters.map(|l| &l.api)))
        .route("/health", get(handlers::health))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics));

    let app = match limiters {
        Some(l) => app.layer(middleware::from_fn_with_state(l.global.clone(), enforce)),
        None => app,
    };

    // Outermost last: request id -> trace -> cors -> compression -> timeout -> body limit -> metrics
    app.layer(middleware::from_fn(app_middleware::track_metrics))
        .layer(DefaultBodyLimit::max(cfg.server.body_limit_bytes))
        .layer(TimeoutLayer::new(cfg.request_timeout()))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&cfg.server.cors_origins))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .with_state(state)
}

/// Image store from configuration; a bad setting disables uploads.
pub fn create_image_store(config: &AppConfig) -> Option<Arc<dyn ImageStore>> {
    let cloudinary = match CloudinaryConfig::from_settings(&config.cloudinary) {
        Ok(Some(c)) => c,
        Ok(None) => {
            tracing::warn!("Cloudinary not configured; image uploads are disabled");
            return None;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cloudinary misconfigured; image uploads are disabled");
            return None;
        }
    };
    tracing::info!(cloud_name = %cloudinary.cloud_name, "Cloudinary image store enabled");
    match CloudinaryClient::new(cloudinary) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build Cloudinary client; image uploads are disabled");
            None
        }
    }
}

pub struct TundraServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Connects to the database (running migrations if configured), sets up
    /// the cache, image store and rate limiters, and builds the router.
    pub async fn build(self) -> anyhow::Result<TundraServer> {
        let cfg = self.config;

        let store = PostgresStore::connect(&cfg.database).await?;
        tracing::info!("Database ready");

        let cache = crate::create_cache_backend(&cfg.redis).await;
        cache.spawn_sweeper(cfg.cache.sweep_interval());
        let images = create_image_store(&cfg);

        let limiters = if cfg.rate_limit.enabled {
            let limiters = RateLimiters::from_config(&cfg.rate_limit)?;
            limiters.spawn_cleanup(cfg.rate_limit.cleanup_interval());
            tracing::info!(
                global = %cfg.rate_limit.global,
                auth = %cfg.rate_limit.auth,
                api = %cfg.rate_limit.api,
                "Rate limiting enabled"
            );
            Some(limiters)
        } else {
            tracing::warn!("Rate limiting disabled");
            None
        };

        let state = AppState::new(cfg, store, cache, images)?;
        let app = build_app(state, limiters.as_ref());

        Ok(TundraServer {
            addr: self.addr,
            app,
        })
    }
}

impl TundraServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        self.run_on(listener).await
    }

    /// Serves on an already bound listener.
    pub async fn run_on(self, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        tracing::info!("listening on {}", listener.local_addr()?);
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
