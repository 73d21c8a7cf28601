//! Sentinel client layer
//!
//! Traits describing what the watcher needs from a single sentinel, plus the
//! TCP/RESP implementations used in production:
//! - [`AgentClient`] / [`SentinelClient`] - command connection to one sentinel
//! - [`ChangeSubscription`] / [`PubSub`] - one live pub/sub subscription
//! - [`AgentConnector`] / [`TcpConnector`] - creates clients for addresses

mod client;
mod connection;
mod pubsub;

pub use client::*;
pub(crate) use connection::*;
pub use pubsub::*;


use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Result;

/// Channel on which sentinels announce a completed failover
pub const SWITCH_MASTER_CHANNEL: &str = "+switch-master";

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AgentClient: Send + Sync + 'static {
    /// `SENTINEL get-master-addr-by-name <name>`
    ///
    /// Returns `Ok(None)` when the sentinel does not monitor `master_name`.
    async fn get_master_addr_by_name(
        &self,
        master_name: &str,
    ) -> Result<Option<String>>;

    /// `SENTINEL sentinels <name>`: addresses of the other sentinels
    /// monitoring `master_name`
    async fn sentinels(
        &self,
        master_name: &str,
    ) -> Result<Vec<String>>;

    /// Opens a subscription to `channel` on a dedicated connection
    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<Arc<dyn ChangeSubscription>>;

    /// Releases the command connection
    async fn close(&self) -> Result<()>;
}

/// A live subscription to one sentinel channel
///
/// Closing the subscription is the only way to stop it; any pending or
/// future [`receive`](ChangeSubscription::receive) then returns `None`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChangeSubscription: Send + Sync + 'static {
    /// Next message payload, or `None` once the stream has ended
    async fn receive(&self) -> Option<String>;

    async fn close(&self) -> Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait AgentConnector: Send + Sync + 'static {
    async fn connect(
        &self,
        addr: &str,
    ) -> Result<Arc<dyn AgentClient>>;
}
