//! Forwarding proxy
//!
//! [`Proxy::forward`] is the browser-facing contract: it always produces a
//! response. [`Proxy::send`] is the in-process variant used by the poller,
//! which needs to tell a backend failure apart from an unreachable backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::header::{self, HeaderName};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use reqwest::redirect::Policy;
use reqwest::Url;

use stackscope_types::Metrics;

use crate::cors::CorsPolicy;
use crate::error::{ProxyError, ProxyResult};
use crate::PROXY_ERROR_HEADER;

/// Headers meaningful only for a single transport hop
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Proxy settings
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Emulated-cloud base URL, e.g. `http://localhost:4566`
    pub backend_url: String,
    /// Default timeout for one forwarded exchange
    pub request_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:4566".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// One request to forward
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Backend path including any query string
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Overrides the proxy's default request timeout
    pub timeout: Option<Duration>,
}

impl ProxyRequest {
    pub fn new(method: Method, path_and_query: impl Into<String>) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    pub fn get(path_and_query: impl Into<String>) -> Self {
        Self::new(Method::GET, path_and_query)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Browser origin of the caller, if sent
    pub fn origin(&self) -> Option<&str> {
        self.headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
    }

    pub fn is_preflight(&self) -> bool {
        self.method == Method::OPTIONS
    }
}

/// One relayed response
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// True when the proxy produced this response itself after a failure
    pub fn is_proxy_error(&self) -> bool {
        self.headers.contains_key(PROXY_ERROR_HEADER)
    }

    /// JSON failure response stamped with [`PROXY_ERROR_HEADER`]
    pub fn from_error(err: &ProxyError) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            HeaderName::from_static(PROXY_ERROR_HEADER),
            HeaderValue::from_static(err.kind()),
        );
        Self {
            status: err.status_code(),
            headers,
            body: Bytes::from(err.body().to_string()),
        }
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Stateless forwarding proxy to the emulated-cloud backend
#[derive(Debug, Clone)]
pub struct Proxy {
    client: reqwest::Client,
    backend: Url,
    request_timeout: Duration,
    cors: CorsPolicy,
    metrics: Arc<Metrics>,
}

impl Proxy {
    /// Create a proxy; fails if the backend URL is not http(s)
    pub fn new(config: ProxyConfig, cors: CorsPolicy, metrics: Arc<Metrics>) -> ProxyResult<Self> {
        let backend = Url::parse(&config.backend_url).map_err(|e| {
            ProxyError::InvalidConfig(format!("backend url {}: {e}", config.backend_url))
        })?;
        if !matches!(backend.scheme(), "http" | "https") {
            return Err(ProxyError::InvalidConfig(format!(
                "backend url {} must be http or https",
                config.backend_url
            )));
        }

        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|e| ProxyError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            backend,
            request_timeout: config.request_timeout,
            cors,
            metrics,
        })
    }

    pub fn backend_url(&self) -> &Url {
        &self.backend
    }

    pub fn cors(&self) -> &CorsPolicy {
        &self.cors
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Forward a browser request and always return a response carrying the
    /// cross-origin headers. Preflights are answered here.
    pub async fn forward(&self, request: ProxyRequest) -> ProxyResponse {
        let origin = request.origin().map(str::to_string);

        if request.is_preflight() {
            return self.preflight(origin.as_deref());
        }

        let mut response = match self.send(request).await {
            Ok(response) => response,
            Err(err) => ProxyResponse::from_error(&err),
        };
        self.cors.apply(&mut response.headers, origin.as_deref());
        response
    }

    /// Empty `200 OK` carrying only the cross-origin headers
    pub fn preflight(&self, origin: Option<&str>) -> ProxyResponse {
        tracing::trace!(origin = ?origin, "Answering preflight");
        ProxyResponse {
            status: StatusCode::OK,
            headers: self.cors.preflight_headers(origin),
            body: Bytes::new(),
        }
    }

    /// Forward a request and return the backend's answer, or a typed error
    /// when the backend could not be reached. Records the attempt either way.
    pub async fn send(&self, request: ProxyRequest) -> ProxyResult<ProxyResponse> {
        let path = request.path_and_query.clone();
        let timeout = request.timeout.unwrap_or(self.request_timeout);
        let started = Instant::now();

        let result = match self.target_url(&path) {
            Ok(target) => self.exchange(request, target, timeout).await,
            Err(err) => Err(err),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let success = matches!(&result, Ok(response) if response.is_success());
        self.metrics.record_attempt(success);
        metrics::counter!(
            "stackscope_proxy_requests_total",
            "outcome" => if success { "success" } else { "failure" }
        )
        .increment(1);

        match &result {
            Ok(response) => tracing::debug!(
                path = %path,
                status = response.status.as_u16(),
                elapsed_ms,
                "Proxied request"
            ),
            Err(err) => tracing::warn!(
                path = %path,
                kind = err.kind(),
                error = %err,
                elapsed_ms,
                "Proxy request failed"
            ),
        }

        result
    }

    async fn exchange(
        &self,
        request: ProxyRequest,
        target: Url,
        timeout: Duration,
    ) -> ProxyResult<ProxyResponse> {
        let timeout_ms = timeout.as_millis() as u64;
        let target_str = target.to_string();
        let to_error = |e: reqwest::Error| ProxyError::from_reqwest(e, &target_str, timeout_ms);

        let is_head = request.method == Method::HEAD;
        let mut builder = self
            .client
            .request(request.method, target)
            .headers(outbound_headers(&request.headers))
            .timeout(timeout);
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let upstream = builder.send().await.map_err(to_error)?;
        let status = upstream.status();
        let headers = relayed_headers(upstream.headers(), is_head);
        let body = upstream.bytes().await.map_err(to_error)?;

        Ok(ProxyResponse {
            status,
            headers,
            body,
        })
    }

    /// Join a path (with query) onto the backend base URL
    pub fn target_url(&self, path_and_query: &str) -> ProxyResult<Url> {
        if !path_and_query.starts_with('/') {
            return Err(ProxyError::InvalidTarget(format!(
                "path must start with '/': {path_and_query}"
            )));
        }
        let base = self.backend.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path_and_query}"))
            .map_err(|e| ProxyError::InvalidTarget(format!("{path_and_query}: {e}")))
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Request headers sent on to the backend
fn outbound_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(incoming.len());
    for (name, value) in incoming {
        if is_hop_by_hop(name) || name == header::HOST || name == header::CONTENT_LENGTH {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

/// Backend response headers relayed to the browser. `Content-Length` is
/// recomputed from the relayed body, except for `HEAD` where there is none.
fn relayed_headers(upstream: &HeaderMap, is_head: bool) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if is_hop_by_hop(name)
            || (name == header::CONTENT_LENGTH && !is_head)
            || name.as_str().starts_with("access-control-")
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(backend: &str) -> Proxy {
        Proxy::new(
            ProxyConfig {
                backend_url: backend.to_string(),
                request_timeout: Duration::from_secs(1),
            },
            CorsPolicy::permissive(),
            Arc::new(Metrics::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_target_url_keeps_path_and_query() {
        let proxy = proxy("http://localhost:4566");
        let url = proxy
            .target_url("/?Action=ListQueues&Version=2012-11-05")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:4566/?Action=ListQueues&Version=2012-11-05"
        );

        let prefixed = self::proxy("http://localhost:4566/cloud/");
        assert_eq!(
            prefixed.target_url("/restapis").unwrap().as_str(),
            "http://localhost:4566/cloud/restapis"
        );
    }

    #[test]
    fn test_target_url_requires_leading_slash() {
        let proxy = proxy("http://localhost:4566");
        assert!(matches!(
            proxy.target_url("restapis"),
            Err(ProxyError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_rejects_non_http_backend() {
        let result = Proxy::new(
            ProxyConfig {
                backend_url: "ftp://localhost".to_string(),
                request_timeout: Duration::from_secs(1),
            },
            CorsPolicy::permissive(),
            Arc::new(Metrics::new()),
        );
        assert!(matches!(result, Err(ProxyError::InvalidConfig(_))));
    }

    #[test]
    fn test_header_filtering() {
        let mut incoming = HeaderMap::new();
        incoming.insert(header::HOST, HeaderValue::from_static("localhost:9999"));
        incoming.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        incoming.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        incoming.insert(
            HeaderName::from_static("x-amz-target"),
            HeaderValue::from_static("DynamoDB_20120810.ListTables"),
        );
        let out = outbound_headers(&incoming);
        assert!(out.get(header::HOST).is_none());
        assert!(out.get(header::CONNECTION).is_none());
        assert_eq!(out["x-amz-target"], "DynamoDB_20120810.ListTables");

        let mut upstream = HeaderMap::new();
        upstream.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/xml"));
        upstream.insert(header::CONTENT_LENGTH, HeaderValue::from_static("512"));
        let relayed = relayed_headers(&upstream, false);
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[header::CONTENT_TYPE], "text/xml");
    }

    #[test]
    fn test_head_response_keeps_content_length() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_LENGTH, HeaderValue::from_static("512"));
        upstream.insert(header::CONNECTION, HeaderValue::from_static("close"));

        let relayed = relayed_headers(&upstream, true);
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[header::CONTENT_LENGTH], "512");
    }

    #[tokio::test]
    async fn test_invalid_target_is_counted() {
        let proxy = proxy("http://127.0.0.1:9");
        let result = proxy.send(ProxyRequest::get("restapis")).await;

        assert!(matches!(result, Err(ProxyError::InvalidTarget(_))));
        assert_eq!(proxy.metrics().total_calls(), 1);
        assert_eq!(proxy.metrics().failed_calls(), 1);
    }

    #[tokio::test]
    async fn test_preflight_is_answered_locally() {
        // Nothing listens on the discard port; a forwarded request would fail
        let proxy = proxy("http://127.0.0.1:9");
        let response = proxy
            .forward(ProxyRequest::new(Method::OPTIONS, "/anything"))
            .await;

        assert_eq!(response.status, StatusCode::OK);
        assert!(response.body.is_empty());
        assert_eq!(response.headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(proxy.metrics().total_calls(), 0);
    }

    #[test]
    fn test_error_response_shape() {
        let err = ProxyError::Connectivity {
            target: "http://127.0.0.1:9/".into(),
            message: "connection refused".into(),
        };
        let response = ProxyResponse::from_error(&err);
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.is_proxy_error());

        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["kind"], "connectivity");
    }
}
