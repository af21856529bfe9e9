//! Periodic snapshot reporting.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::collector::MetricsCollector;
use super::snapshot::Snapshot;
use crate::config::{MetricsConfig, ReportFormat};

/// Polls a collector on a fixed interval and logs each snapshot.
pub struct Reporter {
    metrics: Arc<MetricsCollector>,
    interval: Duration,
    format: ReportFormat,
}

impl Reporter {
    pub fn new(metrics: Arc<MetricsCollector>, interval: Duration, format: ReportFormat) -> Self {
        Self {
            metrics,
            interval: interval.max(Duration::from_millis(1)),
            format,
        }
    }

    pub fn from_config(metrics: Arc<MetricsCollector>, config: &MetricsConfig) -> Self {
        Self::new(metrics, config.report_interval(), config.report_format)
    }

    /// Report until `cancel` fires, then return the final snapshot.
    pub async fn run(self, cancel: CancellationToken) -> Snapshot {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; skip the empty report.
        ticker.tick().await;

        info!(
            interval_ms = self.interval.as_millis() as u64,
            format = ?self.format,
            "metrics reporter started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.report(&self.metrics.snapshot()),
            }
        }

        info!("metrics reporter stopped");
        self.metrics.snapshot()
    }

    fn report(&self, snapshot: &Snapshot) {
        match self.format {
            ReportFormat::Human => info!("{}", format_human(snapshot)),
            ReportFormat::Json => match serde_json::to_string(snapshot) {
                Ok(line) => info!("{line}"),
                Err(e) => warn!(error = %e, "failed to encode snapshot"),
            },
        }
    }
}

/// One-line human summary of a snapshot.
pub fn format_human(s: &Snapshot) -> String {
    format!(
        concat!(
            "sent={} recv={} acked={} failed={} | send {:.1}/s {} recv {:.1}/s {} | ",
            "latency p50={:.2}ms p95={:.2}ms p99={:.2}ms max={:.2}ms",
        ),
        s.messages_sent,
        s.messages_received,
        s.messages_acked,
        s.messages_failed,
        s.throughput.send_rate,
        format_bytes_rate(s.throughput.send_bytes_per_sec),
        s.throughput.receive_rate,
        format_bytes_rate(s.throughput.receive_bytes_per_sec),
        s.latency.p50,
        s.latency.p95,
        s.latency.p99,
        s.latency.max,
    )
}

fn format_bytes_rate(bytes_per_sec: f64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    if bytes_per_sec >= MIB {
        format!("{:.2}MiB/s", bytes_per_sec / MIB)
    } else if bytes_per_sec >= KIB {
        format!("{:.2}KiB/s", bytes_per_sec / KIB)
    } else {
        format!("{bytes_per_sec:.0}B/s")
    }
}
