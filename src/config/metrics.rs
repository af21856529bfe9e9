//! Metrics pipeline configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Latency recorder backing the collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistogramKind {
    /// Retain every sample and sort on read.
    #[default]
    Exact,
    /// HDR buckets with bounded memory.
    Bucketed,
}

/// Snapshot report rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Trailing window for send/receive rates (seconds).
    #[serde(default = "default_throughput_window_secs")]
    pub throughput_window_secs: u64,
    #[serde(default)]
    pub histogram: HistogramKind,
    /// Highest trackable latency in bucketed mode (milliseconds).
    #[serde(default = "default_histogram_max_ms")]
    pub histogram_max_ms: u64,
    /// Significant figures kept in bucketed mode (1..=5).
    #[serde(default = "default_histogram_precision")]
    pub histogram_precision: u8,
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
    #[serde(default)]
    pub report_format: ReportFormat,
}

const fn default_throughput_window_secs() -> u64 {
    10
}

const fn default_histogram_max_ms() -> u64 {
    60_000
}

const fn default_histogram_precision() -> u8 {
    3
}

const fn default_report_interval_ms() -> u64 {
    1_000
}

impl MetricsConfig {
    pub fn throughput_window(&self) -> Duration {
        Duration::from_secs(self.throughput_window_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.throughput_window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "throughput_window_secs",
                reason: "must be > 0".into(),
            });
        }
        if self.histogram_max_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "histogram_max_ms",
                reason: "must be > 0".into(),
            });
        }
        if !(1..=5).contains(&self.histogram_precision) {
            return Err(ConfigError::InvalidValue {
                field: "histogram_precision",
                reason: "must be between 1 and 5".into(),
            });
        }
        if self.report_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "report_interval_ms",
                reason: "must be > 0".into(),
            });
        }
        Ok(())
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            throughput_window_secs: default_throughput_window_secs(),
            histogram: HistogramKind::default(),
            histogram_max_ms: default_histogram_max_ms(),
            histogram_precision: default_histogram_precision(),
            report_interval_ms: default_report_interval_ms(),
            report_format: ReportFormat::default(),
        }
    }
}
