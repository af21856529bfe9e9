//! Canonical test configurations.
//!
//! Single source of truth for config structs used across tests.
//! Avoids each test module defining its own slightly-different defaults.

use std::time::Duration;

use crate::config::{ConsumerConfig, PayloadKind, PoolConfig, ProducerConfig};

/// Small sequential payloads, flushing every send, no throttling.
pub fn producer_config() -> ProducerConfig {
    ProducerConfig {
        workers: 1,
        message_size: 16,
        batch_size: 1,
        payload: PayloadKind::Sequential,
        pattern: "test".into(),
        target_throughput: 0,
        rate_limit: false,
    }
}

/// Consumer with a short receive timeout so idle loops stay responsive.
pub fn consumer_config() -> ConsumerConfig {
    ConsumerConfig {
        workers: 1,
        receive_timeout_ms: 50,
        rate_limit: 0.0,
    }
}

/// Pool config with short stop/remove timeouts.
///
/// For tests that need specific timing behavior, override individual fields
/// on the returned struct.
pub fn pool(workers: usize) -> PoolConfig {
    PoolConfig::new(workers)
        .with_stop_timeout(Duration::from_secs(2))
        .with_remove_timeout(Duration::from_millis(500))
}

/// Pool config throttled to `target` messages/second in aggregate.
pub fn rate_limited_pool(workers: usize, target: u64) -> PoolConfig {
    pool(workers).with_target_throughput(target)
}
