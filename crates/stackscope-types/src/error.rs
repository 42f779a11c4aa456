//! Check failure taxonomy
//!
//! Failures are contained to the service they happened in: they end up as
//! text on that service's [`ServiceResult`](crate::ServiceResult) and never
//! abort a poll cycle.

use thiserror::Error;

use crate::snapshot::ServiceStatus;

/// Why a service check did not come back clean
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckFailure {
    /// Backend unreachable or timed out
    #[error("connectivity: {0}")]
    Connectivity(String),

    /// Backend responded but signalled failure
    #[error("backend returned {status}: {detail}")]
    Backend { status: u16, detail: String },

    /// Listing response could not be interpreted
    #[error("unparseable listing: {0}")]
    Parse(String),
}

impl CheckFailure {
    /// Status a service lands in because of this failure.
    ///
    /// A parse failure leaves the service healthy; only its resource count
    /// goes missing.
    pub fn status(&self) -> ServiceStatus {
        match self {
            Self::Connectivity(_) => ServiceStatus::Unreachable,
            Self::Backend { .. } => ServiceStatus::Unhealthy,
            Self::Parse(_) => ServiceStatus::Healthy,
        }
    }
}
