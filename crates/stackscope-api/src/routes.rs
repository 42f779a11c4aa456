//! API Routes

use axum::{
    routing::{any, get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::state::AppState;

/// Dashboard endpoints and the proxy route
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/snapshot", get(handlers::snapshot::get_snapshot))
        .route("/metrics", get(handlers::metrics::get_metrics))
        .route("/catalog", get(handlers::catalog::get_catalog))
        .route("/logs", get(handlers::logs::get_logs))
        .route("/test", post(handlers::probe::test_service_by_body))
        .route("/test/:service", post(handlers::probe::test_service))
        .merge(proxy_routes())
}

/// Everything under `/api` goes to the backend
fn proxy_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api", any(handlers::proxy::proxy_request))
        .route("/api/", any(handlers::proxy::proxy_request))
        .route("/api/*path", any(handlers::proxy::proxy_request))
}
