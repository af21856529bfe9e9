use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{warm_up, RunBudget, Worker, WorkerContext, WorkerRole, WorkerStats, YIELD_EVERY};
use crate::client::ConsumerClient;
use crate::config::ConsumerConfig;
use crate::error::{ClientError, Error, Result};
use crate::metrics::MetricsCollector;
use crate::ratelimit::RateLimiter;

/// Receives and acknowledges messages through a [`ConsumerClient`].
///
/// Each receive is bounded by the configured timeout; a
/// [`ClientError::Timeout`] is an idle poll, not a failure. Consumers run at
/// a fixed per-worker rate and ignore pool redistribution.
pub struct ConsumerWorker {
    id: usize,
    client: Box<dyn ConsumerClient>,
    metrics: Arc<MetricsCollector>,
    limiter: RateLimiter,
    receive_timeout: Duration,
    warmup: Duration,
    duration: Option<Duration>,
    stopped: AtomicBool,
}

impl ConsumerWorker {
    pub fn new(
        ctx: WorkerContext,
        client: Box<dyn ConsumerClient>,
        config: &ConsumerConfig,
    ) -> Self {
        Self {
            id: ctx.id,
            client,
            metrics: ctx.metrics,
            limiter: RateLimiter::new(config.rate_limit),
            receive_timeout: config.receive_timeout(),
            warmup: ctx.warmup,
            duration: ctx.duration,
            stopped: AtomicBool::new(false),
        }
    }

    fn fail(&self, stats: &mut WorkerStats) {
        self.metrics.record_failure();
        stats.record_failure();
    }
}

#[async_trait]
impl Worker for ConsumerWorker {
    fn id(&self) -> usize {
        self.id
    }

    fn role(&self) -> WorkerRole {
        WorkerRole::Consumer
    }

    async fn run(&self, cancel: CancellationToken) -> WorkerStats {
        let mut stats = WorkerStats::new(self.id, WorkerRole::Consumer);
        stats.start();
        debug!(worker_id = self.id, "consumer started");

        if !warm_up(&cancel, self.warmup).await {
            stats.stop();
            return stats;
        }

        let budget = RunBudget::new(&cancel, self.duration);
        let cancel = budget.token();
        let mut iterations = 0u64;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            if self.limiter.wait(cancel).await.is_err() {
                break;
            }

            let received = tokio::time::timeout(self.receive_timeout, self.client.receive(cancel))
                .await
                .unwrap_or_else(|_| Err(ClientError::Timeout(self.receive_timeout)));
            match received {
                // Idle poll.
                Err(ClientError::Timeout(_)) => {}
                Ok(message) => {
                    self.metrics.record_receive(message.payload().len());
                    stats.record_success();
                    match self.client.ack(message.as_ref()).await {
                        Ok(()) => self.metrics.record_ack(),
                        Err(e) if e.is_cancelled() || cancel.is_cancelled() => break,
                        Err(e) => {
                            debug!(worker_id = self.id, error = %e, "ack failed");
                            self.fail(&mut stats);
                        }
                    }
                }
                Err(e) if e.is_cancelled() || cancel.is_cancelled() => break,
                Err(e) => {
                    debug!(worker_id = self.id, error = %e, "receive failed");
                    self.fail(&mut stats);
                }
            }

            iterations += 1;
            if iterations % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }

        stats.stop();
        debug!(
            worker_id = self.id,
            completed = stats.completed,
            failed = stats.failed,
            "consumer finished"
        );
        stats
    }

    async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.client.close().await.map_err(Error::from)
    }
}
