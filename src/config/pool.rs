//! Worker pool, producer and consumer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Lifecycle limits shared by every pool in a run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Delay before a worker issues its first operation (milliseconds).
    #[serde(default)]
    pub warmup_ms: u64,
    /// Total run duration in seconds. Unset means run until stopped.
    #[serde(default)]
    pub duration_secs: Option<u64>,
    /// Upper bound on waiting for all workers during pool stop (milliseconds).
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    /// Upper bound on waiting for one worker during removal (milliseconds).
    #[serde(default = "default_remove_timeout_ms")]
    pub remove_timeout_ms: u64,
}

const fn default_stop_timeout_ms() -> u64 {
    10_000
}

const fn default_remove_timeout_ms() -> u64 {
    5_000
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            warmup_ms: 0,
            duration_secs: None,
            stop_timeout_ms: default_stop_timeout_ms(),
            remove_timeout_ms: default_remove_timeout_ms(),
        }
    }
}

/// How producer payload bytes are filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    #[default]
    Random,
    Sequential,
    Pattern,
}

/// Producer-role settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProducerConfig {
    #[serde(default = "default_producer_workers")]
    pub workers: usize,
    /// Payload size in bytes.
    #[serde(default = "default_message_size")]
    pub message_size: usize,
    /// Successful sends between flushes. Zero flushes only on stop.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub payload: PayloadKind,
    /// Byte pattern repeated to `message_size` when `payload = "pattern"`.
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Aggregate target across all producers (messages/second). Zero is unlimited.
    #[serde(default)]
    pub target_throughput: u64,
    #[serde(default)]
    pub rate_limit: bool,
}

fn default_producer_workers() -> usize {
    num_cpus::get().clamp(1, 8)
}

const fn default_message_size() -> usize {
    1024
}

const fn default_batch_size() -> usize {
    1
}

fn default_pattern() -> String {
    "msgload".into()
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            workers: default_producer_workers(),
            message_size: default_message_size(),
            batch_size: default_batch_size(),
            payload: PayloadKind::default(),
            pattern: default_pattern(),
            target_throughput: 0,
            rate_limit: false,
        }
    }
}

/// Consumer-role settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_consumer_workers")]
    pub workers: usize,
    /// Bound on each receive call (milliseconds).
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    /// Fixed per-worker receive rate (messages/second). Zero is unlimited.
    #[serde(default)]
    pub rate_limit: f64,
}

const fn default_consumer_workers() -> usize {
    1
}

const fn default_receive_timeout_ms() -> u64 {
    1_000
}

impl ConsumerConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            workers: default_consumer_workers(),
            receive_timeout_ms: default_receive_timeout_ms(),
            rate_limit: 0.0,
        }
    }
}

/// Configuration a [`Pool`](crate::pool::Pool) runs with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolConfig {
    /// Number of workers created when the pool is built.
    pub workers: usize,
    /// Aggregate target rate shared across workers (messages/second). Zero is unlimited.
    pub target_throughput: u64,
    /// Whether workers are throttled toward `target_throughput`.
    pub rate_limit: bool,
    pub warmup: Duration,
    pub duration: Option<Duration>,
    pub stop_timeout: Duration,
    pub remove_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            target_throughput: 0,
            rate_limit: false,
            warmup: Duration::ZERO,
            duration: None,
            stop_timeout: Duration::from_millis(default_stop_timeout_ms()),
            remove_timeout: Duration::from_millis(default_remove_timeout_ms()),
        }
    }
}

impl PoolConfig {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    /// Throttle the pool toward `target` messages/second in aggregate.
    pub fn with_target_throughput(mut self, target: u64) -> Self {
        self.target_throughput = target;
        self.rate_limit = target > 0;
        self
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_remove_timeout(mut self, timeout: Duration) -> Self {
        self.remove_timeout = timeout;
        self
    }

    /// True when workers should be throttled.
    #[must_use]
    pub fn rate_limited(&self) -> bool {
        self.rate_limit && self.target_throughput > 0
    }

    /// Per-worker share of the aggregate target for `workers` workers.
    #[must_use]
    pub fn rate_share(&self, workers: usize) -> Option<f64> {
        if !self.rate_limited() || workers == 0 {
            return None;
        }
        Some(self.target_throughput as f64 / workers as f64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workers",
                reason: "must be > 0".into(),
            });
        }
        if self.stop_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "stop_timeout_ms",
                reason: "must be > 0".into(),
            });
        }
        if self.remove_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "remove_timeout_ms",
                reason: "must be > 0".into(),
            });
        }
        if self.duration.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::InvalidValue {
                field: "duration_secs",
                reason: "must be > 0 when set".into(),
            });
        }
        Ok(())
    }
}
