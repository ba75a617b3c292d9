//! Configuration for the synchronization engine.
//!
//! Plain serde-defaulted structs, loadable from a TOML file with
//! `COALESCE_*` environment overrides layered on top.

use crate::error::SyncError;
use crate::logging::LoggingConfig;
use crate::resolve::ConflictStrategy;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between timer-driven sync cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Bounded timeout applied to each provider read/write call
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Maximum propagation attempts per provider per cycle
    #[serde(default = "default_propagate_max_attempts")]
    pub propagate_max_attempts: u32,

    /// Base delay for exponential propagation backoff (milliseconds)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Cap on the fetch backoff applied after consecutive failed cycles
    #[serde(default = "default_error_backoff_cap_secs")]
    pub error_backoff_cap_secs: u64,

    /// Bounded queue length handed to each event subscriber
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Conflict resolution strategy
    #[serde(default)]
    pub strategy: ConflictStrategy,

    /// Hierarchical cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hierarchical cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Bounded L1 entry count
    #[serde(default = "default_l1_capacity")]
    pub l1_capacity: usize,

    /// Default TTL for the shared L2 tier (seconds, 0 = no expiry)
    #[serde(default = "default_l2_ttl_secs")]
    pub l2_ttl_secs: u64,

    /// Default TTL for the durable L3 tier (seconds, 0 = no expiry)
    #[serde(default = "default_l3_ttl_secs")]
    pub l3_ttl_secs: u64,
}

fn default_interval_secs() -> u64 {
    30
}

fn default_provider_timeout_secs() -> u64 {
    8
}

fn default_propagate_max_attempts() -> u32 {
    4
}

fn default_backoff_base_ms() -> u64 {
    250
}

fn default_error_backoff_cap_secs() -> u64 {
    300
}

fn default_event_queue_capacity() -> usize {
    64
}

fn default_l1_capacity() -> usize {
    1024
}

fn default_l2_ttl_secs() -> u64 {
    300
}

fn default_l3_ttl_secs() -> u64 {
    3600
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            provider_timeout_secs: default_provider_timeout_secs(),
            propagate_max_attempts: default_propagate_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            error_backoff_cap_secs: default_error_backoff_cap_secs(),
            event_queue_capacity: default_event_queue_capacity(),
            strategy: ConflictStrategy::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: default_l1_capacity(),
            l2_ttl_secs: default_l2_ttl_secs(),
            l3_ttl_secs: default_l3_ttl_secs(),
        }
    }
}

impl SyncConfig {
    /// Load configuration: defaults, then an optional TOML file, then
    /// `COALESCE_*` environment variables (e.g. `COALESCE_INTERVAL_SECS`,
    /// `COALESCE_CACHE__L1_CAPACITY`).
    pub fn load(path: Option<&Path>) -> Result<Self, SyncError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            let path_str = path.to_str().ok_or_else(|| {
                SyncError::Config(format!("Non-UTF8 config path: {}", path.display()))
            })?;
            builder = builder.add_source(File::with_name(path_str).required(true));
        }
        builder = builder.add_source(Environment::with_prefix("COALESCE").separator("__"));

        let config: SyncConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SyncError> {
        if self.interval_secs == 0 {
            return Err(SyncError::Config(
                "interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.provider_timeout_secs == 0 {
            return Err(SyncError::Config(
                "provider_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.propagate_max_attempts == 0 {
            return Err(SyncError::Config(
                "propagate_max_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn error_backoff_cap(&self) -> Duration {
        Duration::from_secs(self.error_backoff_cap_secs)
    }
}

impl CacheConfig {
    pub fn l2_ttl(&self) -> Option<Duration> {
        (self.l2_ttl_secs > 0).then(|| Duration::from_secs(self.l2_ttl_secs))
    }

    pub fn l3_ttl(&self) -> Option<Duration> {
        (self.l3_ttl_secs > 0).then(|| Duration::from_secs(self.l3_ttl_secs))
    }
}
