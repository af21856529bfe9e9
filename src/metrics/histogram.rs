//! Latency recorders.
//!
//! [`Histogram`] keeps every sample and computes exact interpolated
//! percentiles on read. [`BucketedHistogram`] trades precision for constant
//! memory using HDR buckets at microsecond resolution.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::error::{Error, Result};

/// Latency summary over the currently retained samples (milliseconds).
///
/// All fields are zero when `count` is zero. Otherwise
/// `min <= p50 <= p95 <= p99 <= p999 <= max`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
    pub count: u64,
}

/// Sink for latency samples shared by all workers.
pub trait LatencyRecorder: Send + Sync {
    /// Record one sample in milliseconds. Non-finite samples are ignored.
    fn observe(&self, millis: f64);

    fn stats(&self) -> LatencyStats;

    fn reset(&self);
}

/// Value at fractional rank `p * (n - 1)` of an ascending slice, linearly
/// interpolated between the two bracketing samples.
///
/// Returns 0.0 for an empty slice. `p` is clamped to `[0, 1]`.
///
/// ```
/// use msgload::metrics::percentile;
///
/// assert_eq!(percentile(&[10.0, 20.0], 0.5), 15.0);
/// assert_eq!(percentile(&[], 0.99), 0.0);
/// ```
#[must_use]
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            if lower == upper {
                return sorted[lower];
            }
            let (lo, hi) = (sorted[lower], sorted[upper]);
            let weight = rank - lower as f64;
            // Clamp away rounding that could step past the upper sample.
            (lo + (hi - lo) * weight).clamp(lo, hi)
        }
    }
}

/// Exact histogram retaining every sample.
///
/// `observe` appends under a write lock; `stats` copies and sorts under a
/// read lock, so reads cost O(n log n) and memory grows with the sample count
/// until [`reset`](LatencyRecorder::reset).
#[derive(Debug, Default)]
pub struct Histogram {
    samples: RwLock<Vec<f64>>,
}

impl Histogram {
    /// An empty histogram.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }
}

impl LatencyRecorder for Histogram {
    fn observe(&self, millis: f64) {
        if !millis.is_finite() {
            return;
        }
        self.samples.write().push(millis.max(0.0));
    }

    fn stats(&self) -> LatencyStats {
        let mut sorted = self.samples.read().clone();
        if sorted.is_empty() {
            return LatencyStats::default();
        }
        sorted.sort_unstable_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        LatencyStats {
            min: sorted[0],
            max: sorted[count - 1],
            mean: sum / count as f64,
            p50: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            p999: percentile(&sorted, 0.999),
            count: count as u64,
        }
    }

    fn reset(&self) {
        self.samples.write().clear();
    }
}

/// HDR-bucketed histogram with bounded memory.
///
/// Samples are stored in microseconds; values above the configured maximum
/// saturate at the top bucket.
pub struct BucketedHistogram {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

impl BucketedHistogram {
    /// Create a histogram tracking up to `max_millis` with `precision`
    /// significant figures (1..=5).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Metrics`] if the bounds are rejected.
    pub fn new(max_millis: u64, precision: u8) -> Result<Self> {
        let high = max_millis.saturating_mul(1_000).max(2);
        let inner = hdrhistogram::Histogram::new_with_bounds(1, high, precision)
            .map_err(|e| Error::Metrics(format!("invalid histogram bounds: {e:?}")))?;
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }
}

impl LatencyRecorder for BucketedHistogram {
    fn observe(&self, millis: f64) {
        if !millis.is_finite() {
            return;
        }
        let micros = (millis.max(0.0) * 1_000.0).round() as u64;
        self.inner.lock().saturating_record(micros.max(1));
    }

    fn stats(&self) -> LatencyStats {
        let hist = self.inner.lock();
        if hist.len() == 0 {
            return LatencyStats::default();
        }
        let ms = |us: u64| us as f64 / 1_000.0;
        LatencyStats {
            min: ms(hist.min()),
            max: ms(hist.max()),
            mean: hist.mean() / 1_000.0,
            p50: ms(hist.value_at_quantile(0.50)),
            p95: ms(hist.value_at_quantile(0.95)),
            p99: ms(hist.value_at_quantile(0.99)),
            p999: ms(hist.value_at_quantile(0.999)),
            count: hist.len(),
        }
    }

    fn reset(&self) {
        self.inner.lock().reset();
    }
}

impl std::fmt::Debug for BucketedHistogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketedHistogram")
            .field("count", &self.inner.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats_are_zero() {
        let h = Histogram::new();
        assert_eq!(h.stats(), LatencyStats::default());
        assert!(h.is_empty());
    }

    #[test]
    fn interpolates_between_two_samples() {
        let h = Histogram::new();
        h.observe(20.0);
        h.observe(10.0);
        let stats = h.stats();
        assert_eq!(stats.p50, 15.0);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 20.0);
        assert_eq!(stats.mean, 15.0);
        assert_eq!(stats.count, 2);
    }

    #[test]
    fn one_to_hundred_percentiles() {
        let h = Histogram::new();
        for v in 1..=100 {
            h.observe(f64::from(v));
        }
        let stats = h.stats();
        assert!((stats.p50 - 50.0).abs() <= 5.0, "p50 = {}", stats.p50);
        assert!((stats.p99 - 99.0).abs() <= 2.0, "p99 = {}", stats.p99);
        assert!(stats.p999 <= stats.max);
        assert_eq!(stats.count, 100);
    }

    #[test]
    fn single_sample_fills_every_field() {
        let h = Histogram::new();
        h.observe(7.5);
        let stats = h.stats();
        assert_eq!(stats.min, 7.5);
        assert_eq!(stats.p50, 7.5);
        assert_eq!(stats.p999, 7.5);
        assert_eq!(stats.max, 7.5);
    }

    #[test]
    fn ignores_non_finite_samples() {
        let h = Histogram::new();
        h.observe(f64::NAN);
        h.observe(f64::INFINITY);
        h.observe(3.0);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn reset_clears_samples() {
        let h = Histogram::new();
        h.observe(1.0);
        h.reset();
        assert_eq!(h.stats().count, 0);
        h.reset();
        assert_eq!(h.stats(), LatencyStats::default());
    }

    #[test]
    fn bucketed_tracks_percentiles_approximately() {
        let h = BucketedHistogram::new(60_000, 3).unwrap();
        for v in 1..=1000 {
            h.observe(f64::from(v) / 10.0);
        }
        let stats = h.stats();
        assert_eq!(stats.count, 1000);
        assert!((stats.p50 - 50.0).abs() < 1.0, "p50 = {}", stats.p50);
        assert!((stats.p99 - 99.0).abs() < 1.0, "p99 = {}", stats.p99);
        assert!(stats.min <= stats.p50 && stats.p999 <= stats.max);

        h.reset();
        assert_eq!(h.stats(), LatencyStats::default());
    }

    #[test]
    fn bucketed_rejects_bad_precision() {
        assert!(matches!(
            BucketedHistogram::new(1_000, 9),
            Err(Error::Metrics(_))
        ));
    }
}
