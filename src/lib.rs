//! msgload - Load generation and measurement for messaging endpoints.
//!
//! This crate drives pools of producer and consumer workers against a
//! messaging client, paces them with token-bucket rate limiters, and
//! records counters, latency percentiles and windowed throughput.
//!
//! # Architecture
//!
//! - **`pool`** - Resizable worker pool with start/stop lifecycle and
//!   aggregate rate redistribution
//! - **`worker`** - Producer and consumer loops plus the factories that
//!   build them from client connectors
//! - **`metrics`** - Lock-light collector shared by every worker
//!   - `Histogram` - exact percentiles over every sample
//!   - `BucketedHistogram` - bounded-memory HDR histogram
//!   - `ThroughputTracker` - sliding-window send/receive rates
//! - **`ratelimit`** - Lock-free token bucket
//! - **`client`** - Client traits and the in-process `MemoryBroker`
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface used by the `msgload` binary
//! - [`client`] - Producer/consumer client traits and the loopback broker
//! - [`config`] - Configuration loading from TOML files
//! - [`error`] - Error types for the crate
//! - [`metrics`] - Counters, histograms, throughput and reporting
//! - [`payload`] - Payload generation
//! - [`pool`] - Worker pool
//! - [`ratelimit`] - Token-bucket rate limiter
//! - [`worker`] - Worker trait and implementations
//!
//! # Features
//!
//! - `testkit` - Mock clients, mock workers and canonical test configs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use msgload::client::MemoryBroker;
//! use msgload::config::{PoolConfig, ProducerConfig};
//! use msgload::metrics::MetricsCollector;
//! use msgload::pool::Pool;
//! use msgload::worker::ProducerFactory;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> msgload::error::Result<()> {
//! let broker = MemoryBroker::new(10_000);
//! let factory = ProducerFactory::new(Arc::new(broker), ProducerConfig::default());
//! let metrics = Arc::new(MetricsCollector::new());
//! let config = PoolConfig::new(4).with_target_throughput(1_000);
//! let pool = Pool::build(config, metrics, &factory).await?;
//!
//! let shutdown = CancellationToken::new();
//! pool.start(&shutdown)?;
//! pool.add_worker(&factory).await?;
//! pool.stop().await?;
//! println!("{:?}", pool.metrics().snapshot());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod payload;
pub mod pool;
pub mod ratelimit;
pub mod worker;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
