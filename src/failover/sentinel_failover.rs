use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::time::timeout;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::MasterCallback;
use super::MasterResolver;
use crate::AgentClient;
use crate::AgentConnector;
use crate::DiscoveryError;
use crate::FailoverConfig;
use crate::NetworkError;
use crate::Result;
use crate::TcpConnector;

/// Sentinel-backed [`MasterResolver`]
///
/// Keeps one cached [`AgentClient`] per sentinel for quorum queries and owns
/// the accepted master address. Arbitration is serialized by an internal
/// mutex, which is also held while the failover callback runs.
pub struct SentinelFailover {
    config: FailoverConfig,
    connector: Arc<dyn AgentConnector>,
    sentinel_addrs: RwLock<Vec<String>>,
    sentinels: DashMap<String, Arc<dyn AgentClient>>,
    state: Mutex<FailoverState>,
    on_failover: RwLock<Option<MasterCallback>>,
}

#[derive(Debug, Default)]
struct FailoverState {
    /// Last accepted master, empty until the first accepted candidate
    master_addr: String,
}

impl SentinelFailover {
    pub fn new(
        config: FailoverConfig,
        connector: Arc<dyn AgentConnector>,
    ) -> Self {
        let sentinel_addrs = RwLock::new(config.sentinel_addrs.clone());
        Self {
            config,
            connector,
            sentinel_addrs,
            sentinels: DashMap::new(),
            state: Mutex::new(FailoverState::default()),
            on_failover: RwLock::new(None),
        }
    }

    /// Resolver talking to sentinels over TCP
    pub fn with_tcp(config: FailoverConfig) -> Self {
        let connector = Arc::new(TcpConnector::new(config.sentinel_options()));
        Self::new(config, connector)
    }

    /// Last accepted master address (empty before the first one)
    pub fn accepted_master(&self) -> String {
        self.state.lock().master_addr.clone()
    }

    async fn sentinel(
        &self,
        addr: &str,
    ) -> Result<Arc<dyn AgentClient>> {
        if let Some(client) = self.sentinels.get(addr).map(|c| c.value().clone()) {
            return Ok(client);
        }

        let client = self.connector.connect(addr).await?;
        let existing = match self.sentinels.entry(addr.to_string()) {
            Entry::Occupied(e) => Some(e.get().clone()),
            Entry::Vacant(e) => {
                e.insert(client.clone());
                None
            }
        };

        // Lost a connect race with a concurrent query
        if let Some(existing) = existing {
            if let Err(e) = client.close().await {
                debug!("closing redundant sentinel client {:?} failed: {}", addr, e);
            }
            return Ok(existing);
        }
        Ok(client)
    }

    async fn query(
        &self,
        addr: &str,
    ) -> Result<Option<String>> {
        let duration = Duration::from_millis(self.config.request_timeout_in_ms);
        let client = self.sentinel(addr).await?;
        match timeout(duration, client.get_master_addr_by_name(&self.config.master_name)).await {
            Ok(answer) => answer,
            Err(_) => Err(NetworkError::RequestTimeout {
                addr: addr.to_string(),
                duration,
            }
            .into()),
        }
    }

    /// Drops the cached client of a failing sentinel
    async fn evict(
        &self,
        addr: &str,
    ) {
        if let Some((_, client)) = self.sentinels.remove(addr) {
            if let Err(e) = client.close().await {
                debug!("closing evicted sentinel client {:?} failed: {}", addr, e);
            }
        }
    }

    /// Adds sentinels reported by `from` that are not yet known
    async fn discover_sentinels(
        &self,
        from: &str,
    ) {
        let client = match self.sentinel(from).await {
            Ok(client) => client,
            Err(e) => {
                debug!("sentinel discovery via {:?} skipped: {}", from, e);
                return;
            }
        };

        match client.sentinels(&self.config.master_name).await {
            Ok(discovered) => {
                let mut addrs = self.sentinel_addrs.write();
                for addr in discovered {
                    if !addrs.contains(&addr) {
                        info!("sentinel: discovered new sentinel={:?} for master={:?}", addr, self.config.master_name);
                        addrs.push(addr);
                    }
                }
            }
            Err(e) => warn!("sentinel: Sentinels master={:?} failed: {}", self.config.master_name, e),
        }
    }
}

#[async_trait]
impl MasterResolver for SentinelFailover {
    fn master_name(&self) -> String {
        self.config.master_name.clone()
    }

    fn sentinel_addrs(&self) -> Vec<String> {
        self.sentinel_addrs.read().clone()
    }

    fn set_on_failover(
        &self,
        callback: MasterCallback,
    ) {
        *self.on_failover.write() = Some(callback);
    }

    async fn master_addr(&self) -> Result<String> {
        let master_name = self.config.master_name.clone();
        let addrs = self.sentinel_addrs.read().clone();
        if addrs.is_empty() {
            return Err(DiscoveryError::NoSentinels.into());
        }

        let answers = join_all(addrs.iter().map(|addr| self.query(addr))).await;

        // (address, votes) in order of first appearance
        let mut tally: Vec<(String, usize)> = Vec::new();
        let mut reachable = 0;
        let mut first_responder: Option<&str> = None;
        for (addr, answer) in addrs.iter().zip(answers) {
            match answer {
                Ok(Some(master)) => {
                    reachable += 1;
                    first_responder.get_or_insert(addr.as_str());
                    match tally.iter_mut().find(|(a, _)| *a == master) {
                        Some((_, votes)) => *votes += 1,
                        None => tally.push((master, 1)),
                    }
                }
                Ok(None) => {
                    reachable += 1;
                    debug!("sentinel {:?} does not monitor master {:?}", addr, master_name);
                }
                Err(e) => {
                    warn!("sentinel: GetMasterAddrByName addr={:?}, master={:?} failed: {}", addr, master_name, e);
                    self.evict(addr).await;
                }
            }
        }

        if reachable == 0 {
            return Err(DiscoveryError::AllSentinelsUnreachable { master_name }.into());
        }

        let mut best: Option<(String, usize)> = None;
        for (addr, votes) in tally {
            if best.as_ref().map_or(true, |(_, top)| votes > *top) {
                best = Some((addr, votes));
            }
        }
        let Some((master, votes)) = best else {
            return Err(DiscoveryError::MasterNotFound { master_name }.into());
        };

        if votes < self.config.quorum {
            return Err(DiscoveryError::NoQuorum {
                master_name,
                votes,
                quorum: self.config.quorum,
            }
            .into());
        }

        if self.config.discover_sentinels {
            if let Some(from) = first_responder {
                self.discover_sentinels(from).await;
            }
        }

        debug!("sentinel: master={:?} resolved to {:?} ({} votes)", master_name, master, votes);
        Ok(master)
    }

    fn try_switch_master(
        &self,
        addr: &str,
    ) {
        let mut state = self.state.lock();
        if state.master_addr == addr {
            return;
        }

        info!(
            "sentinel: new master={:?} addr={:?} (was {:?})",
            self.config.master_name, addr, state.master_addr
        );
        state.master_addr = addr.to_string();

        let callback = self.on_failover.read().clone();
        if let Some(callback) = callback {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(addr))).is_err() {
                error!("on_failover callback panicked for master={:?} addr={:?}", self.config.master_name, addr);
            }
        }
    }

    async fn close(&self) -> Result<()> {
        let addrs: Vec<String> = self.sentinels.iter().map(|e| e.key().clone()).collect();

        let mut first_err = None;
        for addr in addrs {
            if let Some((_, client)) = self.sentinels.remove(&addr) {
                if let Err(e) = client.close().await {
                    warn!("closing sentinel client {:?} failed: {}", addr, e);
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
