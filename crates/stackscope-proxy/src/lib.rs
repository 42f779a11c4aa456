//! stackscope Proxy
//!
//! Browsers refuse to read cross-origin responses from the emulated-cloud
//! endpoint, so every dashboard call goes through this proxy. It:
//!
//! - rewrites the target to the configured backend, keeping method, path,
//!   query and body verbatim
//! - adds the cross-origin headers from a [`CorsPolicy`] to every response
//! - answers `OPTIONS` preflights itself without touching the backend
//! - turns connectivity failures into explicit 5xx JSON responses
//! - records every forwarded exchange in the shared
//!   [`Metrics`](stackscope_types::Metrics)
//!
//! The proxy holds no per-request state, no session and no cache.

pub mod cors;
pub mod error;
pub mod proxy;

pub use cors::CorsPolicy;
pub use error::{ProxyError, ProxyResult};
pub use proxy::{Proxy, ProxyConfig, ProxyRequest, ProxyResponse};

/// Header stamped on responses the proxy generated itself
pub const PROXY_ERROR_HEADER: &str = "x-stackscope-error";
