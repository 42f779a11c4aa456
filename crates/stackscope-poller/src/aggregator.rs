//! Polling aggregator
//!
//! One cycle issues every catalog check concurrently, waits for all of them,
//! and replaces the current snapshot in a single swap. Readers always see
//! either the previous snapshot or the new one, never a mix.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use parking_lot::RwLock;

use stackscope_proxy::Proxy;
use stackscope_types::Snapshot;

use crate::catalog::Catalog;
use crate::check::PendingCheck;

/// Result of one `poll_once` call
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// The cycle ran and its snapshot is now current
    Completed(Arc<Snapshot>),
    /// Another cycle was already in flight; nothing was requested
    Skipped,
}

impl CycleOutcome {
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        match self {
            Self::Completed(snapshot) => Some(snapshot),
            Self::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Cycle counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub in_flight: bool,
}

/// Runs poll cycles and holds the latest snapshot
#[derive(Debug)]
pub struct Aggregator {
    proxy: Arc<Proxy>,
    catalog: Arc<Catalog>,
    check_timeout: Duration,
    current: RwLock<Option<Arc<Snapshot>>>,
    in_flight: AtomicBool,
    cycles_completed: AtomicU64,
    cycles_skipped: AtomicU64,
}

impl Aggregator {
    pub fn new(proxy: Arc<Proxy>, catalog: Arc<Catalog>, check_timeout: Duration) -> Self {
        Self {
            proxy,
            catalog,
            check_timeout,
            current: RwLock::new(None),
            in_flight: AtomicBool::new(false),
            cycles_completed: AtomicU64::new(0),
            cycles_skipped: AtomicU64::new(0),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn proxy(&self) -> &Arc<Proxy> {
        &self.proxy
    }

    pub fn check_timeout(&self) -> Duration {
        self.check_timeout
    }

    /// Latest completed snapshot, `None` before the first cycle finishes
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.read().clone()
    }

    pub fn stats(&self) -> AggregatorStats {
        AggregatorStats {
            cycles_completed: self.cycles_completed.load(Ordering::Acquire),
            cycles_skipped: self.cycles_skipped.load(Ordering::Acquire),
            in_flight: self.in_flight.load(Ordering::Acquire),
        }
    }

    /// Run one cycle, or skip it when another cycle is still in flight
    pub async fn poll_once(&self) -> CycleOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            let skipped = self.cycles_skipped.fetch_add(1, Ordering::AcqRel) + 1;
            metrics::counter!("stackscope_poll_cycles_total", "outcome" => "skipped").increment(1);
            tracing::warn!(cycles_skipped = skipped, "Poll cycle still in flight, skipping tick");
            return CycleOutcome::Skipped;
        };

        let started = Instant::now();
        let checks = self
            .catalog
            .list()
            .iter()
            .map(|descriptor| PendingCheck::new(descriptor, self.check_timeout).run(&self.proxy));
        let results = join_all(checks).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        // Only the guard holder reaches this point, so numbering stays monotonic
        let cycle = self.cycles_completed.load(Ordering::Acquire) + 1;
        let snapshot = Arc::new(Snapshot::new(cycle, Utc::now(), duration_ms, results));
        let summary = snapshot.summary();

        *self.current.write() = Some(snapshot.clone());
        self.cycles_completed.store(cycle, Ordering::Release);

        metrics::counter!("stackscope_poll_cycles_total", "outcome" => "completed").increment(1);
        metrics::gauge!("stackscope_services_healthy").set(summary.healthy as f64);
        tracing::info!(
            cycle,
            duration_ms,
            healthy = summary.healthy,
            unhealthy = summary.unhealthy,
            unreachable = summary.unreachable,
            "Poll cycle completed"
        );

        CycleOutcome::Completed(snapshot)
    }
}

/// Clears the in-flight flag when the cycle ends, even if it is cancelled
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard() {
        let flag = AtomicBool::new(false);
        let guard = InFlightGuard::acquire(&flag).unwrap();
        assert!(InFlightGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(InFlightGuard::acquire(&flag).is_some());
    }
}
