//! Token-bucket rate limiting for worker loops.
//!
//! The bucket state lives in three atomics: the refill rate, the token count
//! and the timestamp of the last refill. Acquisition is a compare-and-swap
//! loop on the token count, so concurrent callers never take a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::Cancelled;

/// Seconds of refill the bucket can hold. Keeps short bursts possible when a
/// waiter oversleeps, without letting an idle worker bank a large backlog.
const BURST_WINDOW_SECS: f64 = 0.1;

/// Lower bound on a single wait between acquisition attempts.
const MIN_WAIT: Duration = Duration::from_millis(1);

/// Upper bound on a single wait, so a lowered rate is picked up promptly.
const MAX_WAIT: Duration = Duration::from_millis(50);

/// Lock-free token bucket.
///
/// A rate of zero means unlimited. The rate can be changed at any time with
/// [`set_rate`](Self::set_rate); waiters pick up the new rate on their next
/// attempt.
///
/// # Example
///
/// ```
/// use msgload::ratelimit::RateLimiter;
///
/// let limiter = RateLimiter::new(100.0);
/// assert!(limiter.try_acquire());
///
/// let unlimited = RateLimiter::unlimited();
/// assert!(unlimited.try_acquire());
/// ```
pub struct RateLimiter {
    /// Tokens per second as `f64` bits.
    rate: AtomicU64,
    /// Available tokens as `f64` bits.
    tokens: AtomicU64,
    /// Nanoseconds since `origin` at the last refill.
    last_refill: AtomicU64,
    origin: Instant,
}

impl RateLimiter {
    /// Create a limiter admitting `rate` operations per second.
    ///
    /// Non-positive or non-finite rates are treated as unlimited. The bucket
    /// starts with a single token so the first caller proceeds immediately.
    pub fn new(rate: f64) -> Self {
        Self {
            rate: AtomicU64::new(sanitize(rate).to_bits()),
            tokens: AtomicU64::new(1.0f64.to_bits()),
            last_refill: AtomicU64::new(0),
            origin: Instant::now(),
        }
    }

    /// A limiter that never throttles.
    pub fn unlimited() -> Self {
        Self::new(0.0)
    }

    /// Current refill rate in tokens per second (zero when unlimited).
    pub fn rate(&self) -> f64 {
        f64::from_bits(self.rate.load(Ordering::Acquire))
    }

    /// Whether a positive rate is in force.
    pub fn is_limited(&self) -> bool {
        self.rate() > 0.0
    }

    /// Change the refill rate.
    ///
    /// Tokens earned under the previous rate are credited first and kept;
    /// the new rate only governs refill from this point on.
    pub fn set_rate(&self, rate: f64) {
        let old = self.rate();
        if old > 0.0 {
            self.refill(old);
        } else {
            // Unlimited until now: start accruing from this instant.
            self.last_refill.store(self.now_nanos(), Ordering::Release);
        }
        self.rate.store(sanitize(rate).to_bits(), Ordering::Release);
    }

    /// Take one token if available without waiting.
    pub fn try_acquire(&self) -> bool {
        let rate = self.rate();
        if rate <= 0.0 {
            return true;
        }
        self.refill(rate);

        let mut current = self.tokens.load(Ordering::Acquire);
        loop {
            let available = f64::from_bits(current);
            if available < 1.0 {
                return false;
            }
            match self.tokens.compare_exchange_weak(
                current,
                (available - 1.0).to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Wait until a token is acquired or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the token fires first. No token is consumed
    /// in that case.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            if self.try_acquire() {
                return Ok(());
            }

            let delay = self.time_to_next_token();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Estimated time until one whole token is available.
    fn time_to_next_token(&self) -> Duration {
        let rate = self.rate();
        if rate <= 0.0 {
            return MIN_WAIT;
        }
        let available = f64::from_bits(self.tokens.load(Ordering::Acquire));
        let deficit = (1.0 - available).max(0.0);
        Duration::from_secs_f64(deficit / rate).clamp(MIN_WAIT, MAX_WAIT)
    }

    /// Credit tokens earned since the last refill at `rate`.
    ///
    /// Only the caller that advances `last_refill` credits the interval, so
    /// each slice of time is counted exactly once.
    fn refill(&self, rate: f64) {
        let now = self.now_nanos();
        let last = self.last_refill.load(Ordering::Acquire);
        if now <= last {
            return;
        }
        if self
            .last_refill
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let earned = (now - last) as f64 / 1e9 * rate;
        let capacity = (rate * BURST_WINDOW_SECS).max(1.0);

        let mut current = self.tokens.load(Ordering::Acquire);
        loop {
            let available = f64::from_bits(current);
            // Tokens above capacity (left from a higher rate) are kept, not trimmed.
            if available >= capacity {
                return;
            }
            let next = (available + earned).min(capacity);
            match self.tokens.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    fn now_nanos(&self) -> u64 {
        // Nonzero so the initial `last_refill` of 0 always reads as "earlier".
        (self.origin.elapsed().as_nanos() as u64).max(1)
    }
}

fn sanitize(rate: f64) -> f64 {
    if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        0.0
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate())
            .field("tokens", &f64::from_bits(self.tokens.load(Ordering::Relaxed)))
            .finish()
    }
}
