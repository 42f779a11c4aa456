//! stackscope Poller
//!
//! Periodically checks every service in the [`Catalog`] through the
//! forwarding proxy and publishes the results as one immutable
//! [`Snapshot`](stackscope_types::Snapshot) per cycle.
//!
//! - [`catalog`]: validated, ordered set of endpoint descriptors
//! - [`check`]: one service's health and listing check
//! - [`aggregator`]: runs a cycle's checks concurrently and swaps in the result
//! - [`scheduler`]: background task that drives the aggregator on an interval

pub mod aggregator;
pub mod catalog;
pub mod check;
pub mod scheduler;

pub use aggregator::{Aggregator, AggregatorStats, CycleOutcome};
pub use catalog::{Catalog, CatalogError};
pub use check::PendingCheck;
pub use scheduler::{PollScheduler, PollerHandle};
