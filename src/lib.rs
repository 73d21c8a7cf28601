//! Master discovery and live failover tracking for sentinel-monitored
//! Redis-compatible clusters.
//!
//! [`SentinelWatcher`] resolves the current master by quorum across a set of
//! sentinels, then keeps it fresh by listening for `+switch-master` on every
//! sentinel. Applications register one callback and are told about each
//! accepted master change exactly once.

mod config;
mod errors;
mod failover;
pub mod resp;
mod sentinel;
pub mod utils;
mod watcher;

pub use config::*;
pub use errors::*;
pub use failover::*;
pub use sentinel::*;
pub use watcher::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
