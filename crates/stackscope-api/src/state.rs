//! Application state shared across handlers

use std::sync::Arc;

use stackscope_poller::{Aggregator, Catalog};
use stackscope_proxy::Proxy;
use stackscope_types::Metrics;

use crate::container_logs::ContainerLogs;

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    /// Poll cycles and the current snapshot
    pub aggregator: Arc<Aggregator>,
    /// Forwarding proxy, shared with the aggregator
    pub proxy: Arc<Proxy>,
    /// Call counters fed by the proxy
    pub metrics: Arc<Metrics>,
    /// Backend container log reader
    pub logs: Arc<ContainerLogs>,
}

impl AppState {
    /// Create a new application state around an aggregator
    pub fn new(aggregator: Arc<Aggregator>, logs: Arc<ContainerLogs>) -> Self {
        let proxy = aggregator.proxy().clone();
        let metrics = proxy.metrics().clone();
        Self {
            aggregator,
            proxy,
            metrics,
            logs,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        self.aggregator.catalog()
    }
}
