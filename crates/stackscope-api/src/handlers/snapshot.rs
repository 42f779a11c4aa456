//! Snapshot Handler

use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Latest completed poll cycle; 503 until the first cycle finishes
pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let snapshot = state
        .aggregator
        .current()
        .ok_or(ApiError::SnapshotNotReady)?;
    Ok(Json(snapshot.as_ref()).into_response())
}
