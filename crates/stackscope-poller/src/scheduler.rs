//! Poll scheduler
//!
//! Background task that ticks on a fixed interval and spawns a poll cycle on
//! each tick. A slow cycle never blocks the tick loop; the aggregator's
//! in-flight guard turns overlapping ticks into skipped cycles. The loop owns
//! every cycle it spawns, so once it stops nothing keeps polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};

use crate::aggregator::{Aggregator, CycleOutcome};

/// Starts the polling loop
pub struct PollScheduler;

impl PollScheduler {
    /// Spawn the loop on the current runtime. The first cycle starts
    /// immediately.
    pub fn spawn(aggregator: Arc<Aggregator>, period: Duration) -> PollerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let period = period.max(Duration::from_millis(1));
        let task = tokio::spawn(run_loop(aggregator, period, shutdown_rx));
        tracing::info!(interval_ms = period.as_millis() as u64, "Poll scheduler started");

        PollerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

async fn run_loop(aggregator: Arc<Aggregator>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut cycles = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let aggregator = aggregator.clone();
                cycles.spawn(async move { aggregator.poll_once().await });
            }
            Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                reap(joined);
            }
            changed = shutdown.changed() => {
                // A dropped handle closes the channel and also stops the loop
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    // Cycles still in flight are cancelled; they publish nothing
    cycles.abort_all();
    while let Some(joined) = cycles.join_next().await {
        reap(joined);
    }

    tracing::info!("Poll scheduler stopped");
}

fn reap(joined: Result<CycleOutcome, JoinError>) {
    match joined {
        Ok(_) => {}
        Err(e) if e.is_cancelled() => {
            tracing::debug!("Poll cycle cancelled by shutdown");
        }
        Err(e) => {
            tracing::error!(error = %e, "Poll cycle task failed");
        }
    }
}

/// Owns the polling task; dropping it stops the loop
#[derive(Debug)]
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Signal the loop to stop and wait for it to exit. A cycle still in
    /// flight is cancelled before this returns.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Poll scheduler task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
