//! Proxy error handling
//!
//! Failures never escape as opaque errors to the browser: each variant has a
//! fixed status code and renders to a machine-readable JSON body.

use axum::http::StatusCode;
use serde_json::json;
use thiserror::Error;

/// Proxy result type
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Errors raised while forwarding a request
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Backend refused or could not be connected to
    #[error("backend connection failed: {message}")]
    Connectivity { target: String, message: String },

    /// Backend did not answer within the request timeout
    #[error("backend timed out after {timeout_ms}ms")]
    Timeout { target: String, timeout_ms: u64 },

    /// Connection was made but the exchange broke down
    #[error("proxy transport error: {message}")]
    Transport { target: String, message: String },

    /// Path could not be joined onto the backend URL
    #[error("invalid proxy target: {0}")]
    InvalidTarget(String),

    /// Proxy or CORS settings are unusable
    #[error("invalid proxy configuration: {0}")]
    InvalidConfig(String),
}

impl ProxyError {
    /// Build from a client error, classifying timeouts and connect failures
    pub fn from_reqwest(err: reqwest::Error, target: &str, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                target: target.to_string(),
                timeout_ms,
            }
        } else if err.is_connect() {
            Self::Connectivity {
                target: target.to_string(),
                message: root_cause(&err),
            }
        } else {
            Self::Transport {
                target: target.to_string(),
                message: root_cause(&err),
            }
        }
    }

    /// Machine-readable failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connectivity { .. } => "connectivity",
            Self::Timeout { .. } => "timeout",
            Self::Transport { .. } => "transport",
            Self::InvalidTarget(_) => "invalid_target",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }

    /// True when the backend could not be reached at all
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Connectivity { .. } | Self::Timeout { .. } | Self::Transport { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Connectivity { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Transport { .. } => StatusCode::BAD_GATEWAY,
            Self::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            Self::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body describing the failure
    pub fn body(&self) -> serde_json::Value {
        let mut body = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        if let Some(target) = self.target() {
            body["target"] = json!(target);
        }
        body
    }

    fn target(&self) -> Option<&str> {
        match self {
            Self::Connectivity { target, .. }
            | Self::Timeout { target, .. }
            | Self::Transport { target, .. } => Some(target),
            _ => None,
        }
    }
}

fn root_cause(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}
