//! Scriptable workers for pool tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Error, Result};
use crate::metrics::MetricsCollector;
use crate::worker::{Worker, WorkerContext, WorkerFactory, WorkerRole, WorkerStats};

/// How a [`MockWorker`] reacts to cancellation and stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Records a send every tick and exits as soon as it is cancelled.
    Cooperative,
    /// Keeps running for the given time after cancellation.
    Stubborn(Duration),
    /// Cooperative, but `stop` fails.
    FailingStop,
    /// Cooperative, but `stop` never completes.
    HangingStop,
}

/// A worker with no client that records into the shared collector.
pub struct MockWorker {
    id: usize,
    behavior: Behavior,
    metrics: Arc<MetricsCollector>,
    rate: AtomicU64,
    runs: AtomicUsize,
    stops: AtomicUsize,
    running: AtomicBool,
}

impl MockWorker {
    pub fn new(ctx: WorkerContext, behavior: Behavior) -> Self {
        Self {
            id: ctx.id,
            behavior,
            metrics: ctx.metrics,
            rate: AtomicU64::new(ctx.rate_share.unwrap_or(0.0).to_bits()),
            runs: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            running: AtomicBool::new(false),
        }
    }

    /// Times `run` has been entered.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Times `stop` has been called.
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for MockWorker {
    fn id(&self) -> usize {
        self.id
    }

    fn role(&self) -> WorkerRole {
        WorkerRole::Producer
    }

    async fn run(&self, cancel: CancellationToken) -> WorkerStats {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        let mut stats = WorkerStats::new(self.id, WorkerRole::Producer);
        stats.start();

        let mut tick = tokio::time::interval(Duration::from_millis(5));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    self.metrics.record_send(1, Duration::from_micros(100));
                    stats.record_success();
                }
            }
        }
        if let Behavior::Stubborn(linger) = self.behavior {
            tokio::time::sleep(linger).await;
        }

        self.running.store(false, Ordering::SeqCst);
        stats.stop();
        stats
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::FailingStop => {
                Err(Error::Client(ClientError::Flush("injected failure".into())))
            }
            Behavior::HangingStop => std::future::pending().await,
            _ => Ok(()),
        }
    }

    fn set_rate(&self, rate: f64) -> bool {
        self.rate.store(rate.to_bits(), Ordering::SeqCst);
        true
    }

    fn rate(&self) -> Option<f64> {
        Some(f64::from_bits(self.rate.load(Ordering::SeqCst)))
    }
}

/// Factory handing out [`MockWorker`]s and keeping them for inspection.
pub struct MockWorkerFactory {
    behavior: Mutex<Behavior>,
    calls: AtomicUsize,
    /// Zero-based `create` call that fails.
    fail_at: AtomicUsize,
    created: Mutex<Vec<Arc<MockWorker>>>,
}

impl MockWorkerFactory {
    pub fn new() -> Self {
        Self::with_behavior(Behavior::Cooperative)
    }

    pub fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
            fail_at: AtomicUsize::new(usize::MAX),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Behavior for workers created from now on.
    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap_or_else(|e| e.into_inner()) = behavior;
    }

    /// Make the next `create` call fail with a connect error.
    pub fn fail_next(&self) {
        self.fail_on_call(self.calls.load(Ordering::SeqCst));
    }

    /// Make the `n`th `create` call (zero-based) fail with a connect error.
    pub fn fail_on_call(&self, n: usize) {
        self.fail_at.store(n, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<Arc<MockWorker>> {
        self.created.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for MockWorkerFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerFactory for MockWorkerFactory {
    async fn create(&self, ctx: WorkerContext) -> Result<Arc<dyn Worker>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == self.fail_at.load(Ordering::SeqCst) {
            return Err(ClientError::Connect(format!("refused worker {}", ctx.id)).into());
        }
        let behavior = *self.behavior.lock().unwrap_or_else(|e| e.into_inner());
        let worker = Arc::new(MockWorker::new(ctx, behavior));
        self.created
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(&worker));
        Ok(worker)
    }
}
