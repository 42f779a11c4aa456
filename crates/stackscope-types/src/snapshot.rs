//! Service results and point-in-time snapshots
//!
//! A [`Snapshot`] holds exactly one [`ServiceResult`] per catalog entry, in
//! catalog order. Both are immutable once built; the aggregator publishes a
//! new snapshot by swapping an `Arc`, so readers never see a half-built
//! cycle.

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::CheckFailure;

/// Terminal state of one service check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Health endpoint answered in time and passed the liveness predicate
    Healthy,
    /// Backend answered but signalled failure
    Unhealthy,
    /// Backend could not be reached or timed out
    Unreachable,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Unreachable => "unreachable",
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one service's check within one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResult {
    /// Catalog service name
    pub service_name: String,
    /// Terminal check state
    pub status: ServiceStatus,
    /// Resources reported by the listing endpoint, when it could be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_count: Option<u64>,
    /// Health request round trip in milliseconds
    pub latency_ms: u64,
    /// Why the check (or its listing) failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceResult {
    /// A healthy result
    pub fn healthy(service_name: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            service_name: service_name.into(),
            status: ServiceStatus::Healthy,
            resource_count: None,
            latency_ms,
            error: None,
        }
    }

    /// A failed result classified from its failure
    pub fn failed(service_name: impl Into<String>, latency_ms: u64, failure: &CheckFailure) -> Self {
        Self {
            service_name: service_name.into(),
            status: failure.status(),
            resource_count: None,
            latency_ms,
            error: Some(failure.to_string()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// One complete, consistent aggregation of every catalog service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Cycle number, starting at 1
    pub cycle: u64,
    /// When the cycle finished
    pub timestamp: DateTime<Utc>,
    /// Wall time the cycle took
    pub duration_ms: u64,
    results: Vec<ServiceResult>,
}

impl Snapshot {
    /// Build a snapshot from results already in catalog order
    pub fn new(
        cycle: u64,
        timestamp: DateTime<Utc>,
        duration_ms: u64,
        results: Vec<ServiceResult>,
    ) -> Self {
        Self {
            cycle,
            timestamp,
            duration_ms,
            results,
        }
    }

    /// Results in catalog order
    pub fn results(&self) -> &[ServiceResult] {
        &self.results
    }

    /// Look up one service's result
    pub fn get(&self, service_name: &str) -> Option<&ServiceResult> {
        self.results.iter().find(|r| r.service_name == service_name)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Derived counts for the renderer
    pub fn summary(&self) -> SnapshotSummary {
        let mut summary = SnapshotSummary {
            total: self.results.len(),
            ..Default::default()
        };
        for result in &self.results {
            match result.status {
                ServiceStatus::Healthy => summary.healthy += 1,
                ServiceStatus::Unhealthy => summary.unhealthy += 1,
                ServiceStatus::Unreachable => summary.unreachable += 1,
            }
            summary.total_resources += result.resource_count.unwrap_or(0);
        }
        summary
    }
}

/// Status counts across one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub unreachable: usize,
    pub total_resources: u64,
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Snapshot", 5)?;
        state.serialize_field("cycle", &self.cycle)?;
        state.serialize_field("timestamp", &self.timestamp)?;
        state.serialize_field("durationMs", &self.duration_ms)?;
        state.serialize_field("results", &ResultsByName(&self.results))?;
        state.serialize_field("summary", &self.summary())?;
        state.end()
    }
}

/// Serializes results as a `serviceName -> result` map in catalog order
struct ResultsByName<'a>(&'a [ServiceResult]);

impl Serialize for ResultsByName<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for result in self.0 {
            map.serialize_entry(&result.service_name, result)?;
        }
        map.end()
    }
}
