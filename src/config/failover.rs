use std::fmt::Debug;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Configuration for sentinel-backed master discovery
///
/// Names the monitored master, lists the sentinels that watch it, and tunes
/// how the resolver talks to them.
#[derive(Serialize, Deserialize, Clone)]
pub struct FailoverConfig {
    /// Name of the master as registered in the sentinels (`sentinel monitor <name> ...`)
    #[serde(default = "default_master_name")]
    pub master_name: String,

    /// Seed list of sentinel addresses (`host:port`)
    /// An empty list is accepted; resolution then fails with `NoSentinels`
    #[serde(default)]
    pub sentinel_addrs: Vec<String>,

    /// ACL user for sentinel connections (Redis 6+)
    #[serde(default)]
    pub sentinel_username: Option<String>,

    /// Password for sentinel connections, sent with `AUTH`
    #[serde(default)]
    pub sentinel_password: Option<String>,

    /// Number of sentinels that must report the same master address
    /// before it is accepted
    #[serde(default = "default_quorum")]
    pub quorum: usize,

    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// Single command round-trip timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// Messages buffered per subscription before the reader applies backpressure
    #[serde(default = "default_subscription_buffer_size")]
    pub subscription_buffer_size: usize,

    /// Learn additional sentinels through `SENTINEL SENTINELS <name>` after each
    /// successful resolution
    #[serde(default)]
    pub discover_sentinels: bool,
}

impl Debug for FailoverConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FailoverConfig")
            .field("master_name", &self.master_name)
            .field("sentinel_addrs", &self.sentinel_addrs)
            .field("sentinel_username", &self.sentinel_username)
            .field("sentinel_password", &self.sentinel_password.as_ref().map(|_| "***"))
            .field("quorum", &self.quorum)
            .field("connect_timeout_in_ms", &self.connect_timeout_in_ms)
            .field("request_timeout_in_ms", &self.request_timeout_in_ms)
            .field("subscription_buffer_size", &self.subscription_buffer_size)
            .field("discover_sentinels", &self.discover_sentinels)
            .finish()
    }
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            master_name: default_master_name(),
            sentinel_addrs: Vec::new(),
            sentinel_username: None,
            sentinel_password: None,
            quorum: default_quorum(),
            connect_timeout_in_ms: default_connect_timeout(),
            request_timeout_in_ms: default_request_timeout(),
            subscription_buffer_size: default_subscription_buffer_size(),
            discover_sentinels: false,
        }
    }
}

impl FailoverConfig {
    /// Shortcut for the common case of a master name plus seed sentinels
    pub fn new(
        master_name: impl Into<String>,
        sentinel_addrs: Vec<String>,
    ) -> Self {
        Self {
            master_name: master_name.into(),
            sentinel_addrs,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.master_name.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "master_name must not be empty".to_string(),
            )));
        }

        if self.quorum == 0 {
            return Err(Error::Config(ConfigError::Message(
                "quorum must be at least 1".to_string(),
            )));
        }

        if self.connect_timeout_in_ms == 0 || self.request_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "timeouts must be > 0 (connect: {}ms, request: {}ms)",
                self.connect_timeout_in_ms, self.request_timeout_in_ms
            ))));
        }

        if self.subscription_buffer_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "subscription_buffer_size must be > 0".to_string(),
            )));
        }

        Ok(())
    }

    /// Per-connection options used for every sentinel connection
    pub fn sentinel_options(&self) -> SentinelOptions {
        SentinelOptions {
            username: self.sentinel_username.clone(),
            password: self.sentinel_password.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_in_ms),
            request_timeout: Duration::from_millis(self.request_timeout_in_ms),
            subscription_buffer_size: self.subscription_buffer_size,
        }
    }
}

/// Connection parameters shared by all sentinel connections
#[derive(Clone)]
pub struct SentinelOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub subscription_buffer_size: usize,
}

impl Debug for SentinelOptions {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SentinelOptions")
            .field("username", &self.username)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("subscription_buffer_size", &self.subscription_buffer_size)
            .finish()
    }
}

impl Default for SentinelOptions {
    fn default() -> Self {
        FailoverConfig::default().sentinel_options()
    }
}

fn default_master_name() -> String {
    "mymaster".to_string()
}
fn default_quorum() -> usize {
    1
}
fn default_connect_timeout() -> u64 {
    1000
}
fn default_request_timeout() -> u64 {
    3000
}
fn default_subscription_buffer_size() -> usize {
    64
}
