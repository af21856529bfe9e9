//! Top-level configuration loading and validation.
//!
//! # Example
//!
//! ```no_run
//! use msgload::config::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.logging.init();
//!     let producers = config.producer_pool();
//!     assert!(producers.workers > 0);
//!     Ok(())
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::logging::LoggingConfig;
use super::metrics::MetricsConfig;
use super::pool::{ConsumerConfig, PoolConfig, ProducerConfig, RunConfig};
use crate::error::{ConfigError, Result};

/// In-process loopback broker settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Messages buffered before sends start failing.
    #[serde(default = "default_broker_capacity")]
    pub capacity: usize,
}

const fn default_broker_capacity() -> usize {
    100_000
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            capacity: default_broker_capacity(),
        }
    }
}

/// Main application configuration.
///
/// Every section is optional; missing fields fall back to their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub producer: ProducerConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse and validate configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML is malformed, or
    /// validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Pool configuration for the producer role.
    pub fn producer_pool(&self) -> PoolConfig {
        PoolConfig {
            workers: self.producer.workers,
            target_throughput: self.producer.target_throughput,
            rate_limit: self.producer.rate_limit,
            ..self.base_pool()
        }
    }

    /// Pool configuration for the consumer role.
    ///
    /// Consumers are throttled per worker through `consumer.rate_limit`, never
    /// by an aggregate target.
    pub fn consumer_pool(&self) -> PoolConfig {
        PoolConfig {
            workers: self.consumer.workers,
            ..self.base_pool()
        }
    }

    fn base_pool(&self) -> PoolConfig {
        PoolConfig {
            warmup: Duration::from_millis(self.run.warmup_ms),
            duration: self.run.duration_secs.map(Duration::from_secs),
            stop_timeout: Duration::from_millis(self.run.stop_timeout_ms),
            remove_timeout: Duration::from_millis(self.run.remove_timeout_ms),
            ..PoolConfig::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.producer.workers == 0 && self.consumer.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workers",
                reason: "at least one producer or consumer is required".into(),
            }
            .into());
        }
        if self.producer.message_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "message_size",
                reason: "must be > 0".into(),
            }
            .into());
        }
        if self.producer.rate_limit && self.producer.target_throughput == 0 {
            return Err(ConfigError::InvalidValue {
                field: "target_throughput",
                reason: "must be > 0 when rate_limit is enabled".into(),
            }
            .into());
        }
        if self.producer.pattern.is_empty() {
            return Err(ConfigError::MissingField { field: "pattern" }.into());
        }
        if !self.consumer.rate_limit.is_finite() || self.consumer.rate_limit < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "consumer.rate_limit",
                reason: "must be a non-negative number".into(),
            }
            .into());
        }
        if self.consumer.receive_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "receive_timeout_ms",
                reason: "must be > 0".into(),
            }
            .into());
        }
        if self.broker.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "broker.capacity",
                reason: "must be > 0".into(),
            }
            .into());
        }
        self.metrics.validate()?;
        if self.producer.workers > 0 {
            self.producer_pool().validate()?;
        }
        if self.consumer.workers > 0 {
            self.consumer_pool().validate()?;
        }
        Ok(())
    }
}
