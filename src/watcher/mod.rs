//! Sentinel watcher
//!
//! Keeps a locally cached master address fresh through two paths:
//! - push: one `+switch-master` subscription per sentinel, each drained by its
//!   own listener task
//! - pull: [`SentinelWatcher::master_addr`] re-queries the sentinels on demand
//!
//! Both paths, and the initial resolution, only ever call the resolver's
//! arbitration entry point. The resolver fires the watcher's trampoline on an
//! accepted change, which records the address and then notifies the user.
//!
//! # Basic Usage
//! ```no_run
//! use sentinel_watch::{FailoverConfig, SentinelWatcher};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut watcher = SentinelWatcher::new(|addr: &str| {
//!         println!("master is now {addr}");
//!     });
//!
//!     let config = FailoverConfig::new(
//!         "mymaster",
//!         vec!["10.0.0.11:26379".into(), "10.0.0.12:26379".into(), "10.0.0.13:26379".into()],
//!     );
//!     watcher.initialize(config).await.unwrap();
//!
//!     let master = watcher.master_addr().await.unwrap();
//!     println!("current master: {master}");
//!
//!     watcher.close().await.unwrap();
//! }
//! ```

mod feed;

use feed::*;


use std::sync::Arc;

use arc_swap::ArcSwap;
use futures::future::join_all;
use tracing::warn;

use crate::AgentConnector;
use crate::Error;
use crate::FailoverConfig;
use crate::MasterCallback;
use crate::MasterResolver;
use crate::Result;
use crate::SentinelFailover;
use crate::SentinelOptions;
use crate::TcpConnector;

/// Read handle on the watcher's cached master address
///
/// Cheap to clone and lock-free to read; suitable for handing to code that
/// needs the current master without owning the watcher.
#[derive(Clone, Default)]
pub struct CurrentMaster(Arc<ArcSwap<String>>);

impl CurrentMaster {
    /// Cached master address, empty before the first resolution
    pub fn get(&self) -> String {
        self.0.load().as_ref().clone()
    }

    fn set(
        &self,
        addr: &str,
    ) {
        self.0.store(Arc::new(addr.to_string()));
    }
}

impl std::fmt::Debug for CurrentMaster {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_tuple("CurrentMaster").field(&self.get()).finish()
    }
}

/// Tracks the current master of a sentinel-monitored cluster
///
/// Created empty, populated once by [`initialize`](SentinelWatcher::initialize)
/// and torn down by [`close`](SentinelWatcher::close), which is idempotent.
pub struct SentinelWatcher {
    current_master: CurrentMaster,
    on_master: MasterCallback,
    connector: Option<Arc<dyn AgentConnector>>,
    resolver: Option<Arc<dyn MasterResolver>>,
    feeds: Vec<AgentFeed>,
}

impl SentinelWatcher {
    /// Creates an uninitialized watcher
    ///
    /// `on_master` is called with the new address on every accepted change.
    /// It may run on any listener task, concurrently with the caller, and
    /// must return promptly: arbitration is blocked while it runs.
    pub fn new<F>(on_master: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            current_master: CurrentMaster::default(),
            on_master: Arc::new(on_master),
            connector: None,
            resolver: None,
            feeds: Vec::new(),
        }
    }

    /// Uses `connector` instead of plain TCP for the per-sentinel feeds (and
    /// for the resolver built by [`initialize`](SentinelWatcher::initialize))
    ///
    /// The connector is kept for every later call; its connection options
    /// take precedence over those of the config passed to `initialize`.
    pub fn with_connector(
        mut self,
        connector: Arc<dyn AgentConnector>,
    ) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Resolves the master through the sentinels in `config` and starts
    /// listening for `+switch-master` on every one of them
    ///
    /// Unless a connector was supplied with
    /// [`with_connector`](SentinelWatcher::with_connector), each call connects
    /// with the options derived from its own `config`, so a retry after a
    /// failed call picks up corrected credentials and timeouts.
    ///
    /// # Errors
    /// - configuration validation errors
    /// - the resolver's resolution error, unchanged; no feed is opened then
    /// - [`Error::AlreadyInitialized`] if a previous call succeeded, also
    ///   after [`close`](SentinelWatcher::close): a watcher is initialized at
    ///   most once
    pub async fn initialize(
        &mut self,
        config: FailoverConfig,
    ) -> Result<()> {
        config.validate()?;
        let connector = self.connector.clone().unwrap_or_else(|| {
            Arc::new(TcpConnector::new(config.sentinel_options())) as Arc<dyn AgentConnector>
        });
        let resolver = Arc::new(SentinelFailover::new(config, connector.clone()));
        self.start(resolver, connector).await
    }

    /// Same as [`initialize`](SentinelWatcher::initialize) with a caller-supplied
    /// resolver
    ///
    /// Feeds connect through the connector set by
    /// [`with_connector`](SentinelWatcher::with_connector), or else over TCP with
    /// [`SentinelOptions::default`]: no `AUTH` and default timeouts. Deployments
    /// whose sentinels require a password must supply a connector.
    pub async fn initialize_with_resolver(
        &mut self,
        resolver: Arc<dyn MasterResolver>,
    ) -> Result<()> {
        let connector = self.connector.clone().unwrap_or_else(|| {
            Arc::new(TcpConnector::new(SentinelOptions::default())) as Arc<dyn AgentConnector>
        });
        self.start(resolver, connector).await
    }

    async fn start(
        &mut self,
        resolver: Arc<dyn MasterResolver>,
        connector: Arc<dyn AgentConnector>,
    ) -> Result<()> {
        if !self.feeds.is_empty() {
            return Err(Error::AlreadyInitialized);
        }
        if let Some(stale) = self.resolver.take() {
            if let Err(e) = stale.close().await {
                warn!("closing resolver of a failed initialization: {}", e);
            }
        }

        let current_master = self.current_master.clone();
        let on_master = self.on_master.clone();
        resolver.set_on_failover(Arc::new(move |addr: &str| {
            current_master.set(addr);
            on_master(addr);
        }));
        self.resolver = Some(resolver.clone());

        let master_addr = resolver.master_addr().await?;
        resolver.try_switch_master(&master_addr);

        self.feeds = join_all(
            resolver
                .sentinel_addrs()
                .into_iter()
                .map(|addr| AgentFeed::open(addr, connector.clone(), resolver.clone())),
        )
        .await;

        Ok(())
    }

    /// Queries the sentinels for the current master and applies the answer
    /// before returning it
    ///
    /// Never falls back to the cached address: on failure the resolver's
    /// error is returned unchanged.
    pub async fn master_addr(&self) -> Result<String> {
        let resolver = self.resolver.as_ref().ok_or(Error::NotInitialized)?;
        let addr = resolver.master_addr().await?;
        resolver.try_switch_master(&addr);
        Ok(addr)
    }

    /// Cached master address, empty before the first resolution
    pub fn current_master(&self) -> String {
        self.current_master.get()
    }

    pub fn current_master_handle(&self) -> CurrentMaster {
        self.current_master.clone()
    }

    /// Sentinel addresses with a feed, in feed order
    pub fn sentinel_addrs(&self) -> Vec<String> {
        self.feeds.iter().map(|feed| feed.addr.clone()).collect()
    }

    /// Number of listener tasks still running
    pub fn active_listeners(&self) -> usize {
        self.feeds.iter().filter(|feed| feed.is_listening()).count()
    }

    /// Releases the resolver, then every subscription, then every sentinel
    /// client
    ///
    /// Every release is attempted; the first error is returned. Released
    /// slots are cleared, so calling `close` again is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let mut first_err = None;

        if let Some(resolver) = self.resolver.take() {
            if let Err(e) = resolver.close().await {
                warn!("closing resolver failed: {}", e);
                first_err.get_or_insert(e);
            }
        }

        for feed in &mut self.feeds {
            if let Err(e) = feed.close_subscription().await {
                first_err.get_or_insert(e);
            }
        }

        for feed in &mut self.feeds {
            if let Err(e) = feed.close_client().await {
                first_err.get_or_insert(e);
            }
        }

        first_err.map_or(Ok(()), Err)
    }
}
