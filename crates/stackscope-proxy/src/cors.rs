//! Cross-origin policy
//!
//! Produces the `Access-Control-*` headers attached to every proxied
//! response and to preflight answers.

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE, VARY,
};
use axum::http::{HeaderMap, HeaderValue, Method};

use crate::error::{ProxyError, ProxyResult};

const DEFAULT_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];
const DEFAULT_HEADERS: &[&str] = &["Content-Type", "Authorization"];
const EXPOSED_HEADERS: &str = "x-request-id, x-stackscope-error";

#[derive(Debug, Clone, PartialEq, Eq)]
enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

/// Cross-origin headers granted to browser callers
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origins: AllowedOrigins,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    max_age: HeaderValue,
}

impl CorsPolicy {
    /// Build a policy. An origin of `*` allows every origin.
    pub fn new(
        origins: &[String],
        methods: &[String],
        headers: &[String],
        max_age_secs: u64,
    ) -> ProxyResult<Self> {
        let origins = if origins.is_empty() || origins.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(
                origins
                    .iter()
                    .map(|o| o.trim_end_matches('/').to_string())
                    .collect(),
            )
        };

        for method in methods {
            Method::from_bytes(method.as_bytes())
                .map_err(|_| ProxyError::InvalidConfig(format!("invalid CORS method {method}")))?;
        }

        let allow_methods = if methods.is_empty() {
            DEFAULT_METHODS.join(", ")
        } else {
            methods.join(", ")
        };
        let allow_headers = if headers.is_empty() {
            DEFAULT_HEADERS.join(", ")
        } else {
            headers.join(", ")
        };

        Ok(Self {
            origins,
            allow_methods: header_value(&allow_methods)?,
            allow_headers: header_value(&allow_headers)?,
            max_age: HeaderValue::from(max_age_secs),
        })
    }

    /// Allow any origin with the default methods and headers
    pub fn permissive() -> Self {
        Self {
            origins: AllowedOrigins::Any,
            allow_methods: HeaderValue::from_static("GET, POST, PUT, DELETE, PATCH, HEAD, OPTIONS"),
            allow_headers: HeaderValue::from_static("Content-Type, Authorization"),
            max_age: HeaderValue::from_static("86400"),
        }
    }

    /// Value for `Access-Control-Allow-Origin`, or `None` when the caller's
    /// origin is not on the allow-list
    pub fn allow_origin(&self, request_origin: Option<&str>) -> Option<HeaderValue> {
        match &self.origins {
            AllowedOrigins::Any => Some(HeaderValue::from_static("*")),
            AllowedOrigins::List(allowed) => {
                let origin = request_origin?;
                if allowed.iter().any(|a| a == origin.trim_end_matches('/')) {
                    HeaderValue::from_str(origin).ok()
                } else {
                    None
                }
            }
        }
    }

    /// Add the cross-origin headers to a response, replacing any present
    pub fn apply(&self, headers: &mut HeaderMap, request_origin: Option<&str>) {
        match self.allow_origin(request_origin) {
            Some(origin) => {
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            }
            None => {
                headers.remove(ACCESS_CONTROL_ALLOW_ORIGIN);
            }
        }
        if matches!(self.origins, AllowedOrigins::List(_)) && !varies_on_origin(headers) {
            headers.append(VARY, HeaderValue::from_static("Origin"));
        }
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        headers.insert(ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        headers.insert(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(EXPOSED_HEADERS),
        );
    }

    /// Headers for a preflight answer
    pub fn preflight_headers(&self, request_origin: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        self.apply(&mut headers, request_origin);
        headers
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

fn varies_on_origin(headers: &HeaderMap) -> bool {
    headers.get_all(VARY).iter().any(|v| {
        v.to_str()
            .map(|s| s.split(',').any(|part| part.trim().eq_ignore_ascii_case("origin")))
            .unwrap_or(false)
    })
}

fn header_value(raw: &str) -> ProxyResult<HeaderValue> {
    HeaderValue::from_str(raw)
        .map_err(|_| ProxyError::InvalidConfig(format!("invalid CORS header value {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_wildcard_origin() {
        let policy = CorsPolicy::new(&strings(&["*"]), &[], &[], 600).unwrap();
        assert_eq!(policy.allow_origin(None).unwrap(), "*");
        assert_eq!(policy.allow_origin(Some("http://evil.test")).unwrap(), "*");

        let headers = policy.preflight_headers(None);
        assert_eq!(headers[ACCESS_CONTROL_MAX_AGE], "600");
        assert!(headers.get(VARY).is_none());
        assert!(headers[ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .unwrap()
            .contains("OPTIONS"));
    }

    #[test]
    fn test_origin_allow_list() {
        let policy = CorsPolicy::new(
            &strings(&["http://localhost:3000/"]),
            &strings(&["GET", "POST"]),
            &strings(&["Content-Type", "X-Amz-Target"]),
            60,
        )
        .unwrap();

        assert_eq!(
            policy.allow_origin(Some("http://localhost:3000")).unwrap(),
            "http://localhost:3000"
        );
        assert!(policy.allow_origin(Some("http://localhost:4000")).is_none());
        assert!(policy.allow_origin(None).is_none());

        let headers = policy.preflight_headers(Some("http://localhost:3000"));
        assert_eq!(headers[VARY], "Origin");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "GET, POST");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type, X-Amz-Target");
    }

    #[test]
    fn test_apply_replaces_backend_origin() {
        let policy = CorsPolicy::new(&strings(&["http://dash.local"]), &[], &[], 60).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));

        policy.apply(&mut headers, Some("http://other.local"));
        assert!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[test]
    fn test_apply_twice_keeps_single_vary() {
        let policy = CorsPolicy::new(&strings(&["http://dash.local"]), &[], &[], 60).unwrap();
        let mut headers = HeaderMap::new();
        policy.apply(&mut headers, Some("http://dash.local"));
        policy.apply(&mut headers, Some("http://dash.local"));
        assert_eq!(headers.get_all(VARY).iter().count(), 1);
    }

    #[test]
    fn test_rejects_bad_method() {
        let result = CorsPolicy::new(&[], &strings(&["GE T"]), &[], 60);
        assert!(matches!(result, Err(ProxyError::InvalidConfig(_))));
    }
}
