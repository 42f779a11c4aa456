//! Metrics Handler

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::dto::MetricsResponse;
use crate::state::AppState;

/// Call counters, uptime and cycle counters
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    Json(MetricsResponse::new(
        state.metrics.snapshot(),
        state.aggregator.stats(),
    ))
}
