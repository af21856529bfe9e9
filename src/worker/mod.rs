//! Workers: the units of concurrent load.
//!
//! A worker runs one operation loop against a messaging client, paces it
//! with a [`RateLimiter`](crate::ratelimit::RateLimiter), and records every
//! outcome into the shared [`MetricsCollector`](crate::metrics::MetricsCollector).
//! The pool only sees the [`Worker`] trait.

mod consumer;
mod factory;
mod producer;
mod stats;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub use consumer::ConsumerWorker;
pub use factory::{ConsumerFactory, ProducerFactory, WorkerContext, WorkerFactory};
pub use producer::ProducerWorker;
pub use stats::WorkerStats;

/// Operations between cooperative yields in a worker loop. Clients that
/// complete without suspending would otherwise starve other tasks.
const YIELD_EVERY: u64 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerRole {
    Producer,
    Consumer,
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Producer => f.write_str("producer"),
            Self::Consumer => f.write_str("consumer"),
        }
    }
}

/// A unit of concurrent execution owned by a pool.
#[async_trait]
pub trait Worker: Send + Sync {
    fn id(&self) -> usize;

    fn role(&self) -> WorkerRole;

    /// Run the operation loop until `cancel` fires or the run budget elapses.
    async fn run(&self, cancel: CancellationToken) -> WorkerStats;

    /// Flush buffered operations and close the client.
    ///
    /// Safe to call after the loop has exited, and more than once.
    async fn stop(&self) -> Result<()>;

    /// Change the worker's rate. Returns false if the worker does not
    /// support live rate changes.
    fn set_rate(&self, _rate: f64) -> bool {
        false
    }

    /// Current rate in operations per second, if the worker is rate-adjustable.
    /// Zero means unlimited.
    fn rate(&self) -> Option<f64> {
        None
    }
}

/// Sleep for the warm-up period. Returns false if `cancel` fired first.
async fn warm_up(cancel: &CancellationToken, warmup: Duration) -> bool {
    if warmup.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(warmup) => true,
    }
}

/// Cancellation scope for one run, optionally bounded by a duration.
///
/// The timer task is aborted when the budget is dropped.
struct RunBudget {
    token: CancellationToken,
    timer: Option<JoinHandle<()>>,
}

impl RunBudget {
    fn new(parent: &CancellationToken, duration: Option<Duration>) -> Self {
        let token = parent.child_token();
        let timer = duration.map(|limit| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(limit) => token.cancel(),
                }
            })
        });
        Self { token, timer }
    }

    fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RunBudget {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_display() {
        assert_eq!(WorkerRole::Producer.to_string(), "producer");
        assert_eq!(WorkerRole::Consumer.to_string(), "consumer");
    }

    #[tokio::test]
    async fn warm_up_aborts_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!warm_up(&cancel, Duration::from_secs(10)).await);
        assert!(!warm_up(&cancel, Duration::ZERO).await);
    }

    #[tokio::test]
    async fn run_budget_cancels_after_duration() {
        let parent = CancellationToken::new();
        let budget = RunBudget::new(&parent, Some(Duration::from_millis(20)));
        tokio::time::timeout(Duration::from_secs(1), budget.token().cancelled())
            .await
            .unwrap();
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn run_budget_follows_parent() {
        let parent = CancellationToken::new();
        let budget = RunBudget::new(&parent, None);
        parent.cancel();
        assert!(budget.token().is_cancelled());
    }
}
