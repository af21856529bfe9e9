//! Rolling-window send and receive rates.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Entries retained before the first compaction pass.
const INITIAL_COMPACT_AT: usize = 4_096;

/// Windowed rates in operations and bytes per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ThroughputStats {
    pub send_rate: f64,
    pub receive_rate: f64,
    pub send_bytes_per_sec: f64,
    pub receive_bytes_per_sec: f64,
}

/// Append-only event log. Timestamps are taken under the lock, so entries are
/// non-decreasing.
#[derive(Debug)]
struct EventLog {
    events: Vec<(Instant, u64)>,
    compact_at: usize,
}

impl EventLog {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            compact_at: INITIAL_COMPACT_AT,
        }
    }

    fn push(&mut self, bytes: u64, window: Duration) {
        let now = Instant::now();
        self.events.push((now, bytes));
        if self.events.len() >= self.compact_at {
            self.compact(now, window);
        }
    }

    /// Drop entries older than the window; grow the threshold when most of
    /// the buffer is still live.
    fn compact(&mut self, now: Instant, window: Duration) {
        if let Some(cutoff) = now.checked_sub(window) {
            let stale = self.events.partition_point(|(at, _)| *at < cutoff);
            self.events.drain(..stale);
        }
        if self.events.len() * 2 >= self.compact_at {
            self.compact_at *= 2;
        }
    }

    /// Count and byte total inside `[now - window, now]`.
    fn in_window(&self, now: Instant, window: Duration) -> (u64, u64) {
        let cutoff = now.checked_sub(window);
        self.events
            .iter()
            .rev()
            .take_while(|(at, _)| cutoff.map_or(true, |c| *at >= c))
            .fold((0, 0), |(n, b), (_, bytes)| (n + 1, b + bytes))
    }

    fn clear(&mut self) {
        self.events.clear();
        self.compact_at = INITIAL_COMPACT_AT;
    }
}

/// Rolling-window throughput tracker.
///
/// Each record appends a timestamp in O(1) amortized. Events that fall out of
/// the window stop counting immediately but are only removed when the log
/// grows past its compaction threshold.
///
/// ```
/// use std::time::Duration;
/// use msgload::metrics::ThroughputTracker;
///
/// let tracker = ThroughputTracker::new(Duration::from_secs(10));
/// for _ in 0..50 {
///     tracker.record_send_bytes(100);
/// }
/// let stats = tracker.stats();
/// assert_eq!(stats.send_rate, 5.0);
/// assert_eq!(stats.send_bytes_per_sec, 500.0);
/// ```
#[derive(Debug)]
pub struct ThroughputTracker {
    window: Duration,
    sends: Mutex<EventLog>,
    receives: Mutex<EventLog>,
}

impl ThroughputTracker {
    /// Create a tracker over a trailing `window`. A zero window is raised to
    /// one millisecond.
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.max(Duration::from_millis(1)),
            sends: Mutex::new(EventLog::new()),
            receives: Mutex::new(EventLog::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Log one send at the current instant.
    pub fn record_send(&self) {
        self.record_send_bytes(0);
    }

    pub fn record_send_bytes(&self, bytes: u64) {
        self.sends.lock().push(bytes, self.window);
    }

    /// Log one receive at the current instant.
    pub fn record_receive(&self) {
        self.record_receive_bytes(0);
    }

    /// Like [`record_receive`](Self::record_receive), also counting `bytes`.
    pub fn record_receive_bytes(&self, bytes: u64) {
        self.receives.lock().push(bytes, self.window);
    }

    pub fn stats(&self) -> ThroughputStats {
        let now = Instant::now();
        let (sent, sent_bytes) = self.sends.lock().in_window(now, self.window);
        let (received, received_bytes) = self.receives.lock().in_window(now, self.window);
        let secs = self.window.as_secs_f64();

        ThroughputStats {
            send_rate: sent as f64 / secs,
            receive_rate: received as f64 / secs,
            send_bytes_per_sec: sent_bytes as f64 / secs,
            receive_bytes_per_sec: received_bytes as f64 / secs,
        }
    }

    /// Drop every logged event.
    pub fn reset(&self) {
        self.sends.lock().clear();
        self.receives.lock().clear();
    }

    #[cfg(test)]
    fn retained(&self) -> usize {
        self.sends.lock().events.len()
    }
}

impl Default for ThroughputTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_is_count_over_window() {
        let tracker = ThroughputTracker::new(Duration::from_secs(10));
        for _ in 0..100 {
            tracker.record_send();
        }
        for _ in 0..20 {
            tracker.record_receive_bytes(64);
        }
        let stats = tracker.stats();
        assert!((stats.send_rate - 10.0).abs() <= 1.0);
        assert_eq!(stats.receive_rate, 2.0);
        assert_eq!(stats.receive_bytes_per_sec, 128.0);
        assert_eq!(stats.send_bytes_per_sec, 0.0);
    }

    #[test]
    fn events_expire_after_window() {
        let tracker = ThroughputTracker::new(Duration::from_millis(50));
        for _ in 0..100 {
            tracker.record_send();
        }
        std::thread::sleep(Duration::from_millis(80));
        let stats = tracker.stats();
        assert_eq!(stats.send_rate, 0.0);
        // Expired entries are excluded, not yet removed.
        assert_eq!(tracker.retained(), 100);
    }

    #[test]
    fn compaction_drops_stale_entries() {
        let tracker = ThroughputTracker::new(Duration::from_millis(10));
        for _ in 0..INITIAL_COMPACT_AT - 1 {
            tracker.record_send();
        }
        std::thread::sleep(Duration::from_millis(20));
        tracker.record_send();
        assert_eq!(tracker.retained(), 1);
    }

    #[test]
    fn compaction_grows_threshold_when_live() {
        let tracker = ThroughputTracker::new(Duration::from_secs(60));
        for _ in 0..INITIAL_COMPACT_AT + 10 {
            tracker.record_send();
        }
        assert_eq!(tracker.retained(), INITIAL_COMPACT_AT + 10);
        assert_eq!(tracker.sends.lock().compact_at, INITIAL_COMPACT_AT * 2);
    }

    #[test]
    fn reset_clears_both_directions() {
        let tracker = ThroughputTracker::default();
        tracker.record_send_bytes(10);
        tracker.record_receive_bytes(10);
        tracker.reset();
        assert_eq!(tracker.stats(), ThroughputStats::default());
    }
}
