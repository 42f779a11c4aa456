//! Single-service check
//!
//! A [`PendingCheck`] is consumed by [`PendingCheck::run`], so every check
//! resolves to exactly one terminal [`ServiceResult`]. There are no retries
//! within a cycle.

use std::time::{Duration, Instant};

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};

use stackscope_proxy::{Proxy, ProxyError, ProxyRequest, ProxyResponse};
use stackscope_types::{
    CheckFailure, EndpointDescriptor, ListingRequest, ParseOutcome, ServiceResult,
};

/// Longest backend body excerpt kept in an error message
const MAX_DETAIL_LEN: usize = 200;

/// A check that has not resolved yet
#[derive(Debug)]
pub struct PendingCheck<'a> {
    descriptor: &'a EndpointDescriptor,
    timeout: Duration,
}

impl<'a> PendingCheck<'a> {
    /// Each backend request the check makes is bounded by `timeout`
    pub fn new(descriptor: &'a EndpointDescriptor, timeout: Duration) -> Self {
        Self {
            descriptor,
            timeout,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.descriptor.service_name
    }

    /// Run the health request, then the listing request when the service is
    /// healthy and has one
    pub async fn run(self, proxy: &Proxy) -> ServiceResult {
        let name = self.descriptor.service_name.as_str();
        let started = Instant::now();
        let health = self.health(proxy).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        metrics::histogram!("stackscope_check_latency_ms", "service" => name.to_string())
            .record(latency_ms as f64);

        if let Err(failure) = health {
            tracing::debug!(service = name, status = %failure.status(), error = %failure, "Service check failed");
            return ServiceResult::failed(name, latency_ms, &failure);
        }

        let mut result = ServiceResult::healthy(name, latency_ms);
        if let Some(listing) = &self.descriptor.listing {
            match self.listing(proxy, listing).await {
                Ok(count) => result.resource_count = count,
                Err(failure) => {
                    tracing::debug!(service = name, error = %failure, "Resource listing failed");
                    result.error = Some(failure.to_string());
                }
            }
        }
        result
    }

    async fn health(&self, proxy: &Proxy) -> Result<(), CheckFailure> {
        let request = ProxyRequest::get(self.descriptor.health_path.as_str()).with_timeout(self.timeout);
        let response = proxy.send(request).await.map_err(connectivity)?;

        if !response.is_success() {
            return Err(CheckFailure::Backend {
                status: response.status.as_u16(),
                detail: excerpt(&response),
            });
        }

        self.descriptor
            .liveness
            .evaluate(&response.body)
            .map_err(|detail| CheckFailure::Backend {
                status: response.status.as_u16(),
                detail,
            })
    }

    /// `Ok(None)` when the parser has no listing semantics
    async fn listing(
        &self,
        proxy: &Proxy,
        listing: &ListingRequest,
    ) -> Result<Option<u64>, CheckFailure> {
        let request = listing_request(listing)?.with_timeout(self.timeout);
        let response = proxy
            .send(request)
            .await
            .map_err(|e| CheckFailure::Parse(format!("listing request failed: {e}")))?;

        if !response.is_success() {
            return Err(CheckFailure::Parse(format!(
                "listing returned {}: {}",
                response.status.as_u16(),
                excerpt(&response)
            )));
        }

        match self.descriptor.parser.parse(&response.body) {
            ParseOutcome::Count(count) => Ok(Some(count)),
            ParseOutcome::NotApplicable => Ok(None),
            ParseOutcome::Unparseable(reason) => Err(CheckFailure::Parse(reason)),
        }
    }
}

fn connectivity(err: ProxyError) -> CheckFailure {
    CheckFailure::Connectivity(err.to_string())
}

/// Translate a catalog listing into a proxy request
pub fn listing_request(listing: &ListingRequest) -> Result<ProxyRequest, CheckFailure> {
    let method = Method::from_bytes(listing.method.as_bytes())
        .map_err(|_| CheckFailure::Parse(format!("invalid listing method {}", listing.method)))?;

    let mut headers = HeaderMap::with_capacity(listing.headers.len());
    for (name, value) in &listing.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| CheckFailure::Parse(format!("invalid listing header {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| CheckFailure::Parse(format!("invalid value for listing header {name}")))?;
        headers.insert(name, value);
    }

    let mut request = ProxyRequest::new(method, listing.path.as_str()).with_headers(headers);
    if let Some(body) = &listing.body {
        request = request.with_body(body.clone());
    }
    Ok(request)
}

fn excerpt(response: &ProxyResponse) -> String {
    let text = String::from_utf8_lossy(&response.body);
    let text = text.trim();
    match text.char_indices().nth(MAX_DETAIL_LEN) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
