//! Configuration management for the sentinel watcher.
//!
//! Provides hierarchical configuration loading from multiple sources with priority:
//! 1. Default values (hardcoded)
//! 2. Config file named by `CONFIG_PATH`
//! 3. Explicit override files
//! 4. Environment variables (highest priority)
//!
//! Environment variables use the `SENTINEL_WATCH` prefix and `__` as the
//! nesting separator, e.g. `SENTINEL_WATCH__FAILOVER__MASTER_NAME=mymaster`.
//! `SENTINEL_WATCH__FAILOVER__SENTINEL_ADDRS` takes a comma-separated list.

mod failover;
pub use failover::*;


//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

const ENV_PREFIX: &str = "SENTINEL_WATCH";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct WatcherConfig {
    /// Master discovery and sentinel connection settings
    #[serde(default)]
    pub failover: FailoverConfig,
}

impl WatcherConfig {
    /// Creates a new configuration with hierarchical override support:
    ///
    /// Configuration sources are merged in the following order (later sources
    /// override earlier ones):
    /// 1. Type defaults
    /// 2. Configuration file from `CONFIG_PATH` environment variable
    /// 3. Environment variables with `SENTINEL_WATCH__` prefix
    ///
    /// Validation is deferred to [`validate`](WatcherConfig::validate).
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(environment());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    ///
    /// # Example
    /// ```ignore
    /// let cfg = WatcherConfig::new()?
    ///     .with_override_config("sentinel-watch.toml")?
    ///     .validate()?;
    /// ```
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    pub fn validate(self) -> Result<Self> {
        self.failover.validate()?;
        Ok(self)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("failover.sentinel_addrs")
        .ignore_empty(true)
        .try_parsing(true)
}
