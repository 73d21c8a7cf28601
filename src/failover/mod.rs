//! Master resolution and arbitration
//!
//! [`MasterResolver`] is the contract the watcher relies on: a quorum-backed
//! lookup of the current master and a single serialized entry point,
//! [`try_switch_master`](MasterResolver::try_switch_master), through which every
//! accepted change flows. [`SentinelFailover`] implements it on top of any
//! [`AgentConnector`](crate::AgentConnector).

mod event;
mod sentinel_failover;

pub use event::*;
pub use sentinel_failover::*;


use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Invoked with the new master address on every accepted change
pub type MasterCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MasterResolver: Send + Sync + 'static {
    /// Name of the monitored master
    fn master_name(&self) -> String;

    /// Sentinel addresses currently known to the resolver
    fn sentinel_addrs(&self) -> Vec<String>;

    /// Registers the callback fired by [`try_switch_master`](MasterResolver::try_switch_master)
    fn set_on_failover(
        &self,
        callback: MasterCallback,
    );

    /// Quorum-backed lookup of the current master address
    ///
    /// Safe to call repeatedly and concurrently.
    async fn master_addr(&self) -> Result<String>;

    /// Arbitrates a candidate master address
    ///
    /// Idempotent: the callback fires at most once per actual change and
    /// never for a candidate equal to the accepted master.
    fn try_switch_master(
        &self,
        addr: &str,
    );

    /// Releases the connections used for quorum queries
    async fn close(&self) -> Result<()>;
}
