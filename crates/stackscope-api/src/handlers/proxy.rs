//! Forwarding Proxy Handler
//!
//! `/api/<path>` is forwarded to `<backend>/<path>` with the query string,
//! method, headers and body unchanged.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, Uri},
};

use stackscope_proxy::{ProxyRequest, ProxyResponse};

use crate::state::AppState;

/// Route prefix stripped before forwarding
pub const PROXY_PREFIX: &str = "/api";

pub async fn proxy_request(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ProxyResponse {
    let request = ProxyRequest::new(method, backend_path(&uri))
        .with_headers(headers)
        .with_body(body);
    state.proxy.forward(request).await
}

/// Backend path and query for an incoming `/api/...` URI
pub fn backend_path(uri: &Uri) -> String {
    let path = uri.path().strip_prefix(PROXY_PREFIX).unwrap_or(uri.path());
    let path = if path.is_empty() { "/" } else { path };
    match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}
