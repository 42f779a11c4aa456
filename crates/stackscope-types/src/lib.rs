//! stackscope Types - Canonical types shared by the proxy, poller and API
//!
//! This crate has zero dependencies on other stackscope crates. It defines:
//!
//! - Endpoint catalog descriptors and their closed set of liveness checks
//!   and resource parsers
//! - Per-service check results and the point-in-time [`Snapshot`]
//! - The process-wide [`Metrics`] accumulator
//!
//! # Data Flow
//!
//! ```text
//! EndpointDescriptor ──(health + listing via proxy)──→ ServiceResult
//!        × N                                              × N
//!                                                          ↓
//!                                   Snapshot (one result per descriptor)
//! ```

pub mod catalog;
pub mod snapshot;
pub mod metrics;
pub mod error;

pub use catalog::*;
pub use snapshot::*;
pub use metrics::*;
pub use error::*;
