//! Store configuration
//!
//! Settings are merged with the following priority (lowest first):
//! 1. Default values (hardcoded)
//! 2. Pre-parsed settings handed in by the embedding process
//! 3. Environment variables (`CHAMBER_STORE__*`, highest priority)
//!
//! This crate never opens configuration files; the embedding process parses
//! them and passes the result to [`StoreConfig::load`].

mod trace;
pub use trace::*;


use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::Environment;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

const ENV_PREFIX: &str = "CHAMBER_STORE";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Backing store client endpoints
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Upper bound for establishing a connection, in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// Upper bound for every store operation, in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// Appended verbatim to the effective namespace
    #[serde(default)]
    pub namespace_suffix: String,

    #[serde(default)]
    pub trace_flags: TraceFlags,

    #[serde(default)]
    pub test_namespace: TestNamespaceConfig,

    /// Guarded commit attempts before a transaction gives up under contention
    #[serde(default = "default_max_txn_attempts")]
    pub max_txn_attempts: usize,

    /// Events buffered per watch subscription
    #[serde(default = "default_watch_buffer_size")]
    pub watch_buffer_size: usize,
}

/// Test isolation settings
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct TestNamespaceConfig {
    /// Root all keys under the test namespace instead of the production one
    #[serde(default)]
    pub use_test_namespace: bool,

    /// Delete everything under the test namespace on connect
    #[serde(default)]
    pub clean_on_connect: bool,

    /// Give each connection its own test namespace
    #[serde(default)]
    pub uniquify: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            connect_timeout_in_ms: default_connect_timeout(),
            request_timeout_in_ms: default_request_timeout(),
            namespace_suffix: String::new(),
            trace_flags: TraceFlags::default(),
            test_namespace: TestNamespaceConfig::default(),
            max_txn_attempts: default_max_txn_attempts(),
            watch_buffer_size: default_watch_buffer_size(),
        }
    }
}

impl StoreConfig {
    /// Merge defaults, `settings` and environment overrides, then validate
    pub fn load(settings: Option<Config>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&StoreConfig::default())?);

        if let Some(settings) = settings {
            builder = builder.add_source(settings);
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("endpoints")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: StoreConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::Config("at least one endpoint required".to_string()));
        }
        if let Some(endpoint) = self.endpoints.iter().find(|e| e.trim().is_empty()) {
            return Err(ConfigError::Message(format!("invalid endpoint {endpoint:?}")).into());
        }
        if self.connect_timeout_in_ms == 0 {
            return Err(Error::Config("connect_timeout_in_ms must be > 0".to_string()));
        }
        if self.request_timeout_in_ms == 0 {
            return Err(Error::Config("request_timeout_in_ms must be > 0".to_string()));
        }
        if self.max_txn_attempts == 0 {
            return Err(Error::Config("max_txn_attempts must be > 0".to_string()));
        }
        if self.watch_buffer_size == 0 {
            return Err(Error::Config("watch_buffer_size must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_in_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_in_ms)
    }
}

fn default_endpoints() -> Vec<String> {
    vec!["http://127.0.0.1:2379".to_string()]
}
fn default_connect_timeout() -> u64 {
    5000
}
fn default_request_timeout() -> u64 {
    10000
}
fn default_max_txn_attempts() -> usize {
    8
}
fn default_watch_buffer_size() -> usize {
    64
}
