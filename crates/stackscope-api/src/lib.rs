//! stackscope API
//!
//! HTTP surface consumed by the dashboard.
//!
//! # API Structure
//!
//! ```text
//! /
//! ├── /health          - stackscope's own liveness
//! ├── /snapshot        - latest poll cycle results
//! ├── /metrics         - call counters, uptime, cycle counters
//! ├── /catalog         - polled services
//! ├── /logs            - backend container logs
//! ├── /test/:service   - out-of-band test call through the proxy
//! ├── /api/*           - forwarding proxy to the backend
//! └── /*               - static dashboard files
//! ```
//!
//! Every response carries the cross-origin headers and `OPTIONS` preflights
//! are answered before any handler runs.

pub mod container_logs;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderName;
use axum::Router;
use tower_http::{
    compression::CompressionLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub use container_logs::{ContainerLogs, LogsConfig};
pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Enable response compression
    pub enable_compression: bool,
    /// Enable request tracing
    pub enable_tracing: bool,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Requests slower than this are logged at warn
    pub slow_request_threshold: Duration,
    /// Directory served for unmatched paths
    pub static_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable_compression: true,
            enable_tracing: true,
            max_body_size: 10 * 1024 * 1024, // 10MB
            slow_request_threshold: Duration::from_secs(1),
            static_dir: Some(PathBuf::from("static")),
        }
    }
}

/// Create the main router with all middleware
pub fn create_router(state: Arc<AppState>, config: ApiConfig) -> Router {
    let mut router = routes::api_routes();

    if let Some(dir) = &config.static_dir {
        router = router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    let mut router = router
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::cors_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            config.slow_request_threshold,
            middleware::timing_middleware,
        ))
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .with_state(state);

    if config.enable_compression {
        router = router.layer(CompressionLayer::new());
    }

    if config.enable_tracing {
        router = router.layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");

                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            },
        ));
    }

    // Outermost, so the trace span sees the assigned id
    let x_request_id = HeaderName::from_static("x-request-id");
    router
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
}

/// Create a minimal router for testing
pub fn create_test_router(state: Arc<AppState>) -> Router {
    create_router(
        state,
        ApiConfig {
            enable_compression: false,
            enable_tracing: false,
            static_dir: None,
            ..ApiConfig::default()
        },
    )
}
