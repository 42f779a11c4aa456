//! Response bodies for stackscope's own endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stackscope_poller::AggregatorStats;
use stackscope_types::{EndpointDescriptor, MetricsSnapshot};

/// `GET /metrics` body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub total_calls: u64,
    pub failed_calls: u64,
    /// Fraction of successful calls, 1.0 before any call
    pub success_rate: f64,
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
}

impl MetricsResponse {
    pub fn new(metrics: MetricsSnapshot, stats: AggregatorStats) -> Self {
        Self {
            started_at: metrics.started_at,
            uptime_seconds: metrics.uptime_seconds,
            total_calls: metrics.total_calls,
            failed_calls: metrics.failed_calls,
            success_rate: metrics.success_rate,
            cycles_completed: stats.cycles_completed,
            cycles_skipped: stats.cycles_skipped,
        }
    }
}

/// One `GET /catalog` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub service_name: String,
    pub health_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_path: Option<String>,
    pub parser: String,
}

impl From<&EndpointDescriptor> for CatalogEntry {
    fn from(descriptor: &EndpointDescriptor) -> Self {
        Self {
            service_name: descriptor.service_name.clone(),
            health_path: descriptor.health_path.clone(),
            listing_method: descriptor.listing.as_ref().map(|l| l.method.clone()),
            listing_path: descriptor.listing.as_ref().map(|l| l.path.clone()),
            parser: descriptor.parser.kind().to_string(),
        }
    }
}

/// `POST /test` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRequest {
    pub service: String,
}
