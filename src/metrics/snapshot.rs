use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::histogram::LatencyStats;
use super::throughput::ThroughputStats;

/// Point-in-time view of a [`MetricsCollector`](super::MetricsCollector).
///
/// Fields are read independently, so they agree "as of roughly the same
/// instant" rather than forming one atomic cut.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub messages_acked: u64,
    pub messages_failed: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub latency: LatencyStats,
    pub throughput: ThroughputStats,
    /// Time since the collector was started.
    #[serde(serialize_with = "as_secs")]
    pub elapsed: Duration,
    /// Time since the last reset (or start, if never reset).
    #[serde(serialize_with = "as_secs")]
    pub since_reset: Duration,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Messages sent per second averaged over the current epoch.
    pub fn average_send_rate(&self) -> f64 {
        per_second(self.messages_sent, self.since_reset)
    }

    pub fn average_receive_rate(&self) -> f64 {
        per_second(self.messages_received, self.since_reset)
    }

    /// True when every counter and derived statistic is zero.
    pub fn is_zeroed(&self) -> bool {
        self.messages_sent == 0
            && self.messages_received == 0
            && self.messages_acked == 0
            && self.messages_failed == 0
            && self.bytes_sent == 0
            && self.bytes_received == 0
            && self.latency == LatencyStats::default()
            && self.throughput == ThroughputStats::default()
    }
}

fn per_second(count: u64, over: Duration) -> f64 {
    let secs = over.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
