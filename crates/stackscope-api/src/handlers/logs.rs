//! Container Logs Handler

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::container_logs::LogsResponse;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Recent backend container logs, or troubleshooting hints
pub async fn get_logs(State(state): State<Arc<AppState>>) -> ApiResult<Json<LogsResponse>> {
    if state.logs.config().containers.is_empty() {
        return Err(ApiError::LogsUnavailable(
            "no container names configured".to_string(),
        ));
    }
    Ok(Json(state.logs.fetch().await))
}
