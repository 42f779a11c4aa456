//! API Handlers
//!
//! One module per endpoint group.

pub mod catalog;
pub mod health;
pub mod logs;
pub mod metrics;
pub mod probe;
pub mod proxy;
pub mod snapshot;

pub use health::*;
