//! Configuration for the transaction subsystem.
//!
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```
//! use txgov::config::GovernanceConfig;
//!
//! let config = GovernanceConfig::from_json_str(r#"{ "pool_max_size": 4 }"#).unwrap();
//! assert_eq!(config.pool_max_size, 4);
//! assert_eq!(config.retry.max_retries, 3);
//! ```

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transaction::{DEFAULT_CALLBACK_QUEUE_CAPACITY, DEFAULT_POOL_SIZE, DEFAULT_TIMEOUT};

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub interval_ms: u64,
    /// Multiplier applied to the delay after every retry.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            interval_ms: 100,
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Settings shared by managers, pools, state machines and retry policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Handle timeout in milliseconds. Zero selects the default.
    pub transaction_timeout_ms: u64,
    /// Idle handles a pool keeps.
    pub pool_max_size: usize,
    pub retry: RetryConfig,
    /// Pending state callbacks buffered before new ones are dropped.
    pub callback_queue_capacity: usize,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_ms: 0,
            pool_max_size: DEFAULT_POOL_SIZE,
            retry: RetryConfig::default(),
            callback_queue_capacity: DEFAULT_CALLBACK_QUEUE_CAPACITY,
        }
    }
}

impl GovernanceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective handle timeout.
    pub fn transaction_timeout(&self) -> Duration {
        match self.transaction_timeout_ms {
            0 => DEFAULT_TIMEOUT,
            ms => Duration::from_millis(ms),
        }
    }

    /// Set the handle timeout.
    pub fn transaction_timeout_ms(mut self, ms: u64) -> Self {
        self.transaction_timeout_ms = ms;
        self
    }

    /// Set the pool size.
    pub fn pool_max_size(mut self, size: usize) -> Self {
        self.pool_max_size = size;
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the callback queue capacity.
    pub fn callback_queue_capacity(mut self, capacity: usize) -> Self {
        self.callback_queue_capacity = capacity;
        self
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.pool_max_size == 0 {
            return Err(ConfigError::Invalid("pool_max_size must be positive".into()));
        }
        if self.callback_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "callback_queue_capacity must be positive".into(),
            ));
        }
        let factor = self.retry.backoff_factor;
        if !factor.is_finite() || factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry.backoff_factor must be a finite number >= 1, got {}",
                factor
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}
