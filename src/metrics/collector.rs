use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;

use super::histogram::{BucketedHistogram, Histogram, LatencyRecorder};
use super::snapshot::Snapshot;
use super::throughput::ThroughputTracker;
use crate::config::{HistogramKind, MetricsConfig};
use crate::error::Result;

/// Shared metrics sink for every worker in a pool.
///
/// Counters are plain atomics, so recording never blocks on other recorders.
/// Latency and throughput go to their own recorders, which serialize
/// internally.
///
/// A [`Snapshot`] is assembled from independent loads. Under concurrent
/// recording its fields are consistent as of roughly the same instant, not
/// linearizable across fields: `messages_sent` may already include a send
/// whose latency sample is not yet visible.
pub struct MetricsCollector {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    messages_acked: AtomicU64,
    messages_failed: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    latency: Box<dyn LatencyRecorder>,
    throughput: ThroughputTracker,
    started_at: RwLock<Instant>,
    reset_at: RwLock<Instant>,
}

impl MetricsCollector {
    /// Collector with an exact histogram and a 10 second throughput window.
    pub fn new() -> Self {
        Self::with_parts(Box::new(Histogram::new()), ThroughputTracker::default())
    }

    /// Build a collector from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucketed histogram bounds are invalid.
    pub fn with_config(config: &MetricsConfig) -> Result<Self> {
        let latency: Box<dyn LatencyRecorder> = match config.histogram {
            HistogramKind::Exact => Box::new(Histogram::new()),
            HistogramKind::Bucketed => Box::new(BucketedHistogram::new(
                config.histogram_max_ms,
                config.histogram_precision,
            )?),
        };
        Ok(Self::with_parts(
            latency,
            ThroughputTracker::new(config.throughput_window()),
        ))
    }

    pub fn with_parts(latency: Box<dyn LatencyRecorder>, throughput: ThroughputTracker) -> Self {
        let now = Instant::now();
        Self {
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_acked: AtomicU64::new(0),
            messages_failed: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            latency,
            throughput,
            started_at: RwLock::new(now),
            reset_at: RwLock::new(now),
        }
    }

    /// Record a successful send of `bytes` that took `latency`.
    pub fn record_send(&self, bytes: usize, latency: Duration) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.latency.observe(latency.as_secs_f64() * 1_000.0);
        self.throughput.record_send_bytes(bytes as u64);
    }

    /// Record a received message of `bytes`.
    pub fn record_receive(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        self.throughput.record_receive_bytes(bytes as u64);
    }

    /// Count an acknowledged message.
    pub fn record_ack(&self) {
        self.messages_acked.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed operation of either role.
    pub fn record_failure(&self) {
        self.messages_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_acked: self.messages_acked.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            latency: self.latency.stats(),
            throughput: self.throughput.stats(),
            elapsed: self.started_at.read().elapsed(),
            since_reset: self.reset_at.read().elapsed(),
            taken_at: Utc::now(),
        }
    }

    /// Zero every counter, clear latency and throughput, and restart the
    /// epoch clock.
    ///
    /// The reset is not atomic across fields. Each counter is zeroed by its
    /// own store, so a `record_*` call racing the reset may be kept in one
    /// field and dropped from another. With no concurrent writers every field
    /// reads zero afterwards.
    pub fn reset(&self) {
        self.messages_sent.store(0, Ordering::Relaxed);
        self.messages_received.store(0, Ordering::Relaxed);
        self.messages_acked.store(0, Ordering::Relaxed);
        self.messages_failed.store(0, Ordering::Relaxed);
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.latency.reset();
        self.throughput.reset();
        *self.reset_at.write() = Instant::now();
    }

    /// Restart both clocks. Called when a pool starts.
    pub fn mark_started(&self) {
        let now = Instant::now();
        *self.started_at.write() = now;
        *self.reset_at.write() = now;
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("messages_sent", &self.messages_sent.load(Ordering::Relaxed))
            .field("messages_received", &self.messages_received.load(Ordering::Relaxed))
            .field("messages_failed", &self.messages_failed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
