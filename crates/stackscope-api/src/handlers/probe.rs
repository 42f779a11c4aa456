//! Test Call Handlers
//!
//! Out-of-band calls a user triggers from the dashboard. They take the same
//! proxy path as polling, so they are counted in the call metrics, and the
//! backend's answer is returned as-is.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};

use stackscope_poller::check::listing_request;
use stackscope_proxy::{ProxyRequest, ProxyResponse};
use stackscope_types::EndpointDescriptor;

use crate::dto::TestRequest;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /test/:service`
pub async fn test_service(
    State(state): State<Arc<AppState>>,
    Path(service): Path<String>,
) -> ApiResult<ProxyResponse> {
    run_test_call(&state, &service).await
}

/// `POST /test` with `{"service": "<name>"}`
pub async fn test_service_by_body(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TestRequest>, JsonRejection>,
) -> ApiResult<ProxyResponse> {
    let Json(request) = body?;
    run_test_call(&state, &request.service).await
}

async fn run_test_call(state: &AppState, service: &str) -> ApiResult<ProxyResponse> {
    let descriptor = state
        .catalog()
        .get(service)
        .ok_or_else(|| ApiError::ServiceNotFound(service.to_string()))?;

    let request = test_request(descriptor)?;
    tracing::info!(service, path = %request.path_and_query, "Running test call");
    Ok(state.proxy.forward(request).await)
}

/// The service's listing request, or its health request when it has none
fn test_request(descriptor: &EndpointDescriptor) -> ApiResult<ProxyRequest> {
    match &descriptor.listing {
        Some(listing) => listing_request(listing).map_err(|e| ApiError::Internal(e.to_string())),
        None => Ok(ProxyRequest::get(descriptor.health_path.as_str())),
    }
}
