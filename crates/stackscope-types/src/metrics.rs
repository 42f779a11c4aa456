//! Process-wide call metrics
//!
//! Counters are append-only for the lifetime of the process: nothing resets
//! them short of a restart. Both counters sit behind one mutex so a reader
//! always sees `total_calls >= failed_calls`.

use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    total_calls: u64,
    failed_calls: u64,
}

/// Running counters for every proxied request
#[derive(Debug)]
pub struct Metrics {
    started_at: DateTime<Utc>,
    started: Instant,
    counters: Mutex<Counters>,
}

impl Metrics {
    /// Start counting from now
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Record one proxied request
    pub fn record_attempt(&self, success: bool) {
        let mut counters = self.counters.lock();
        counters.total_calls += 1;
        if !success {
            counters.failed_calls += 1;
        }
    }

    pub fn total_calls(&self) -> u64 {
        self.counters.lock().total_calls
    }

    pub fn failed_calls(&self) -> u64 {
        self.counters.lock().failed_calls
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Seconds since the accumulator was created
    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Consistent copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = *self.counters.lock();
        let success_rate = if counters.total_calls == 0 {
            1.0
        } else {
            (counters.total_calls - counters.failed_calls) as f64 / counters.total_calls as f64
        };

        MetricsSnapshot {
            started_at: self.started_at,
            uptime_seconds: self.uptime_seconds(),
            total_calls: counters.total_calls,
            failed_calls: counters.failed_calls,
            success_rate,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of [`Metrics`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub total_calls: u64,
    pub failed_calls: u64,
    /// Fraction of calls that succeeded (1.0 before any call)
    pub success_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_record_attempt() {
        let metrics = Metrics::new();
        metrics.record_attempt(true);
        metrics.record_attempt(false);
        metrics.record_attempt(true);

        assert_eq!(metrics.total_calls(), 3);
        assert_eq!(metrics.failed_calls(), 1);

        let snapshot = metrics.snapshot();
        assert!((snapshot.success_rate - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fresh_metrics() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.total_calls, 0);
        assert_eq!(snapshot.failed_calls, 0);
        assert_eq!(snapshot.success_rate, 1.0);
        assert_eq!(snapshot.uptime_seconds, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_stay_consistent() {
        let metrics = Arc::new(Metrics::new());

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    for n in 0..500 {
                        metrics.record_attempt((n + i) % 3 != 0);
                    }
                })
            })
            .collect();

        let reader = {
            let metrics = metrics.clone();
            tokio::spawn(async move {
                let mut last = metrics.snapshot();
                for _ in 0..1000 {
                    let now = metrics.snapshot();
                    assert!(now.total_calls >= now.failed_calls);
                    assert!(now.total_calls >= last.total_calls);
                    assert!(now.failed_calls >= last.failed_calls);
                    last = now;
                    tokio::task::yield_now().await;
                }
            })
        };

        for writer in writers {
            writer.await.unwrap();
        }
        reader.await.unwrap();

        assert_eq!(metrics.total_calls(), 4000);
    }
}
