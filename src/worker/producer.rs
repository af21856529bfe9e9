use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{warm_up, RunBudget, Worker, WorkerContext, WorkerRole, WorkerStats, YIELD_EVERY};
use crate::client::ProducerClient;
use crate::config::ProducerConfig;
use crate::error::{Error, Result};
use crate::metrics::MetricsCollector;
use crate::payload::PayloadGenerator;
use crate::ratelimit::RateLimiter;

/// Sends generated payloads through a [`ProducerClient`].
///
/// The rate limiter is always present (unlimited when no share is assigned)
/// so the pool can start or change throttling while the worker runs.
pub struct ProducerWorker {
    id: usize,
    client: Box<dyn ProducerClient>,
    metrics: Arc<MetricsCollector>,
    limiter: RateLimiter,
    payloads: PayloadGenerator,
    batch_size: usize,
    warmup: Duration,
    duration: Option<Duration>,
    stopped: AtomicBool,
}

impl ProducerWorker {
    pub fn new(
        ctx: WorkerContext,
        client: Box<dyn ProducerClient>,
        config: &ProducerConfig,
    ) -> Self {
        Self {
            id: ctx.id,
            client,
            metrics: ctx.metrics,
            limiter: RateLimiter::new(ctx.rate_share.unwrap_or(0.0)),
            payloads: PayloadGenerator::from_config(config),
            batch_size: config.batch_size,
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
impl Worker for ProducerWorker {
    fn id(&self) -> usize {
        self.id
    }

    fn role(&self) -> WorkerRole {
        WorkerRole::Producer
    }

    async fn run(&self, cancel: CancellationToken) -> WorkerStats {
        let mut stats = WorkerStats::new(self.id, WorkerRole::Producer);
        stats.start();
        debug!(worker_id = self.id, rate = self.limiter.rate(), "producer started");

        if !warm_up(&cancel, self.warmup).await {
            stats.stop();
            return stats;
        }

        let budget = RunBudget::new(&cancel, self.duration);
        let cancel = budget.token();
        let mut payloads = self.payloads.clone();
        let mut unflushed = 0usize;
        let mut iterations = 0u64;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            if self.limiter.wait(cancel).await.is_err() {
                break;
            }

            let payload = payloads.next_payload();
            let bytes = payload.len();
            let started = Instant::now();
            match self.client.send(cancel, payload).await {
                Ok(_) => {
                    self.metrics.record_send(bytes, started.elapsed());
                    stats.record_success();

                    if self.batch_size > 0 {
                        unflushed += 1;
                        if unflushed >= self.batch_size {
                            unflushed = 0;
                            if let Err(e) = self.client.flush().await {
                                debug!(worker_id = self.id, error = %e, "flush failed");
                                self.fail(&mut stats);
                            }
                        }
                    }
                }
                Err(e) if e.is_cancelled() || cancel.is_cancelled() => break,
                Err(e) => {
                    debug!(worker_id = self.id, error = %e, "send failed");
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
            "producer finished"
        );
        stats
    }

    async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let flushed = self.client.flush().await;
        let closed = self.client.close().await;
        flushed.and(closed).map_err(Error::from)
    }

    fn set_rate(&self, rate: f64) -> bool {
        self.limiter.set_rate(rate);
        debug!(worker_id = self.id, rate, "producer rate updated");
        true
    }

    fn rate(&self) -> Option<f64> {
        Some(self.limiter.rate())
    }
}
