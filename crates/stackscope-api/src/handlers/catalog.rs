//! Catalog Handler

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::dto::CatalogEntry;
use crate::state::AppState;

/// Configured services in polling order
pub async fn get_catalog(State(state): State<Arc<AppState>>) -> Json<Vec<CatalogEntry>> {
    Json(state.catalog().list().iter().map(CatalogEntry::from).collect())
}
