//! Contention-tolerant measurement pipeline.
//!
//! A [`MetricsCollector`] is created per run and shared through `Arc` with
//! every worker. It combines atomic counters with a [`LatencyRecorder`] and a
//! [`ThroughputTracker`], and produces [`Snapshot`]s on demand.

mod collector;
mod histogram;
mod reporter;
mod snapshot;
mod throughput;

pub use collector::MetricsCollector;
pub use histogram::{percentile, BucketedHistogram, Histogram, LatencyRecorder, LatencyStats};
pub use reporter::{format_human, Reporter};
pub use snapshot::Snapshot;
pub use throughput::{ThroughputStats, ThroughputTracker};
