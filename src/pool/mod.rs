//! Dynamically resizable worker pool.
//!
//! The pool owns its workers and shares one
//! [`MetricsCollector`](crate::metrics::MetricsCollector) with all of them.
//!
//! # Lifecycle
//!
//! `Stopped --start()--> Running --stop()--> Stopped (closed)`
//!
//! Workers can be added and removed in either state; they only run while the
//! pool is running. Stop closes every worker's client, so a stopped pool
//! cannot be started again.
//!
//! # Cancellation
//!
//! `start` derives a run token from the caller's token, and every worker
//! runs under its own child of the run token. Stop cancels the run token;
//! remove cancels exactly one worker.
//!
//! # Locking
//!
//! All structural state sits behind one mutex that is never held across an
//! await point. Waiting on worker tasks and closing clients happens after
//! the lock is released, bounded by `stop_timeout` / `remove_timeout`.

use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::metrics::MetricsCollector;
use crate::worker::{Worker, WorkerContext, WorkerFactory};

mod spawn;
mod state;

use state::{lock_or_recover, PoolState, ShutdownReport, WorkerSlot};

/// Pool of concurrently running workers with runtime resize.
pub struct Pool {
    config: PoolConfig,
    metrics: Arc<MetricsCollector>,
    state: Mutex<PoolState>,
}

impl Pool {
    /// Create an empty pool with its own metrics collector.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: PoolConfig) -> Result<Self> {
        Self::with_metrics(config, Arc::new(MetricsCollector::new()))
    }

    /// Create an empty pool recording into `metrics`.
    ///
    /// Several pools may share one collector, e.g. a producer pool and a
    /// consumer pool in the same run.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_metrics(config: PoolConfig, metrics: Arc<MetricsCollector>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            metrics,
            state: Mutex::new(PoolState::new()),
        })
    }

    /// Create a pool and populate it with `config.workers` workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or any worker fails
    /// to build. Workers built before the failure are stopped.
    pub async fn build(
        config: PoolConfig,
        metrics: Arc<MetricsCollector>,
        factory: &dyn WorkerFactory,
    ) -> Result<Self> {
        let pool = Self::with_metrics(config, metrics)?;
        for _ in 0..pool.config.workers {
            if let Err(e) = pool.add_worker(factory).await {
                // Nothing is running yet, so this only closes clients.
                if let Err(cleanup) = pool.stop().await {
                    warn!(error = %cleanup, "failed to clean up partially built pool");
                }
                return Err(e);
            }
        }
        Ok(pool)
    }

    /// Launch one task per worker and return immediately.
    ///
    /// # Errors
    ///
    /// [`PoolError::AlreadyRunning`] if the pool is running, or
    /// [`PoolError::Closed`] if it has been stopped.
    pub fn start(&self, parent: &CancellationToken) -> Result<()> {
        let mut state = lock_or_recover(&self.state);
        if state.is_running() {
            return Err(PoolError::AlreadyRunning.into());
        }
        if state.closed {
            return Err(PoolError::Closed.into());
        }

        self.metrics.mark_started();
        let run_token = parent.child_token();
        for slot in &mut state.workers {
            slot.start(&run_token);
        }
        state.run_token = Some(run_token);

        info!(
            workers = state.workers.len(),
            target_throughput = self.config.target_throughput,
            rate_limited = self.config.rate_limited(),
            "pool started"
        );
        Ok(())
    }

    /// Stop every worker and close its client.
    ///
    /// Worker tasks and client closes share one `stop_timeout` deadline;
    /// anything still pending at the deadline is abandoned so the caller is
    /// never hung. Calling stop on an already stopped pool is a no-op.
    ///
    /// # Errors
    ///
    /// [`PoolError::Shutdown`] listing workers that timed out or failed to
    /// close. The pool is stopped either way.
    pub async fn stop(&self) -> Result<()> {
        let (handles, workers) = {
            let mut state = lock_or_recover(&self.state);
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            if let Some(run_token) = state.run_token.take() {
                run_token.cancel();
            }
            let handles: Vec<_> = state
                .workers
                .iter_mut()
                .filter_map(|slot| slot.handle.take().map(|h| (slot.id(), h)))
                .collect();
            (handles, state.worker_handles())
        };

        info!(workers = workers.len(), "pool stopping");

        let mut report = ShutdownReport::default();
        let deadline = Instant::now() + self.config.stop_timeout;
        let joined = join_all(
            handles
                .into_iter()
                .map(|(id, handle)| async move { (id, timeout_at(deadline, handle).await) }),
        )
        .await;
        for (id, outcome) in joined {
            match outcome {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!(worker_id = id, error = %e, "worker task failed");
                    report.failed(id, e);
                }
                Err(_) => {
                    warn!(worker_id = id, "worker did not stop in time, detaching");
                    report.timed_out(id);
                }
            }
        }

        let closed = join_all(
            workers
                .iter()
                .map(|w| async move { (w.id(), timeout_at(deadline, w.stop()).await) }),
        )
        .await;
        for (id, outcome) in closed {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(worker_id = id, error = %e, "failed to close worker");
                    report.failed(id, e);
                }
                Err(_) => {
                    warn!(worker_id = id, "worker close did not finish in time, abandoning");
                    report.timed_out(id);
                }
            }
        }

        let result = report.into_result();
        info!(clean = result.is_ok(), "pool stopped");
        result.map_err(Into::into)
    }

    /// Build a worker with `factory` and append it, starting it if the pool
    /// is running. Returns the new worker's id.
    ///
    /// # Errors
    ///
    /// [`PoolError::Factory`] if the factory fails (the pool is unchanged),
    /// or [`PoolError::Closed`] if the pool has been stopped.
    pub async fn add_worker(&self, factory: &dyn WorkerFactory) -> Result<usize> {
        let (id, rate_share) = {
            let mut state = lock_or_recover(&self.state);
            if state.closed {
                return Err(PoolError::Closed.into());
            }
            let id = state.next_id;
            state.next_id += 1;
            (id, self.config.rate_share(state.workers.len() + 1))
        };

        let ctx = WorkerContext {
            id,
            metrics: Arc::clone(&self.metrics),
            rate_share,
            warmup: self.config.warmup,
            duration: self.config.duration,
        };
        let worker = factory.create(ctx).await.map_err(|e| PoolError::Factory {
            worker_id: id,
            source: Box::new(e),
        })?;

        let inserted = {
            let mut state = lock_or_recover(&self.state);
            if state.closed {
                None
            } else {
                let mut slot = WorkerSlot::new(Arc::clone(&worker));
                if let Some(run_token) = &state.run_token {
                    slot.start(run_token);
                }
                state.workers.push(slot);
                Some((state.workers.len(), state.is_running()))
            }
        };

        let Some((count, running)) = inserted else {
            // Stopped while the worker was being built.
            if let Err(e) = worker.stop().await {
                debug!(worker_id = id, error = %e, "failed to close orphaned worker");
            }
            return Err(PoolError::Closed.into());
        };

        info!(worker_id = id, role = %worker.role(), workers = count, running, "worker added");
        self.redistribute();
        Ok(id)
    }

    /// Remove the most recently added worker.
    ///
    /// The worker is taken out of the pool immediately. Its task and its
    /// client close share one `remove_timeout` deadline; whatever is still
    /// pending at the deadline is abandoned. The rate is then redistributed
    /// over the remaining workers.
    ///
    /// # Errors
    ///
    /// [`PoolError::LastWorker`] if one or no worker remains (nothing is
    /// changed), or [`PoolError::Shutdown`] if the worker timed out or failed
    /// to close (it is still removed).
    pub async fn remove_worker(&self) -> Result<()> {
        let (mut slot, remaining) = {
            let mut state = lock_or_recover(&self.state);
            let count = state.workers.len();
            if count <= 1 {
                return Err(PoolError::LastWorker { count }.into());
            }
            let Some(slot) = state.workers.pop() else {
                return Err(PoolError::LastWorker { count }.into());
            };
            (slot, count - 1)
        };

        let id = slot.id();
        slot.cancel();

        let mut report = ShutdownReport::default();
        let deadline = Instant::now() + self.config.remove_timeout;
        if let Some(handle) = slot.handle.take() {
            match timeout_at(deadline, handle).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!(worker_id = id, error = %e, "worker task failed");
                    report.failed(id, e);
                }
                Err(_) => {
                    warn!(worker_id = id, "worker did not stop in time, detaching");
                    report.timed_out(id);
                }
            }
        }
        match timeout_at(deadline, slot.worker.stop()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(worker_id = id, error = %e, "failed to close worker");
                report.failed(id, e);
            }
            Err(_) => {
                warn!(worker_id = id, "worker close did not finish in time, abandoning");
                report.timed_out(id);
            }
        }

        info!(worker_id = id, workers = remaining, "worker removed");
        self.redistribute();
        report.into_result().map_err(Into::into)
    }

    /// Split the aggregate target evenly across the current workers.
    ///
    /// Rates are applied under the state lock so concurrent resizes cannot
    /// land a stale share last. `set_rate` is a non-blocking store.
    fn redistribute(&self) {
        if !self.config.rate_limited() {
            return;
        }
        let (workers, adjusted, share) = {
            let state = lock_or_recover(&self.state);
            let Some(share) = self.config.rate_share(state.workers.len()) else {
                return;
            };
            let adjusted = state
                .workers
                .iter()
                .filter(|slot| slot.worker.set_rate(share))
                .count();
            (state.workers.len(), adjusted, share)
        };
        info!(
            workers,
            adjusted,
            rate = share,
            target_throughput = self.config.target_throughput,
            "rate redistributed"
        );
    }

    /// Current rate of each worker by id, in insertion order.
    pub fn worker_rates(&self) -> Vec<(usize, Option<f64>)> {
        lock_or_recover(&self.state)
            .workers
            .iter()
            .map(|slot| (slot.id(), slot.worker.rate()))
            .collect()
    }

    pub fn worker_ids(&self) -> Vec<usize> {
        lock_or_recover(&self.state)
            .workers
            .iter()
            .map(WorkerSlot::id)
            .collect()
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        lock_or_recover(&self.state).is_running()
    }

    pub fn worker_count(&self) -> usize {
        lock_or_recover(&self.state).workers.len()
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock_or_recover(&self.state);
        f.debug_struct("Pool")
            .field("workers", &state.workers.len())
            .field("running", &state.is_running())
            .field("closed", &state.closed)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let state = lock_or_recover(&self.state);
        if let Some(run_token) = &state.run_token {
            run_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests;
