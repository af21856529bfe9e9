//! Pool internal state types.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::PoolError;
use crate::worker::{Worker, WorkerStats};

use super::spawn::spawn_worker;

/// Everything guarded by the pool mutex.
pub(super) struct PoolState {
    /// Workers in insertion order; removal takes from the back.
    pub(super) workers: Vec<WorkerSlot>,
    pub(super) next_id: usize,
    /// Parent of every worker token while the pool is running.
    pub(super) run_token: Option<CancellationToken>,
    /// Set once stop has closed the workers' clients.
    pub(super) closed: bool,
}

impl PoolState {
    pub(super) fn new() -> Self {
        Self {
            workers: Vec::new(),
            next_id: 0,
            run_token: None,
            closed: false,
        }
    }

    pub(super) fn is_running(&self) -> bool {
        self.run_token.is_some()
    }

    pub(super) fn worker_handles(&self) -> Vec<Arc<dyn Worker>> {
        self.workers.iter().map(|s| Arc::clone(&s.worker)).collect()
    }
}

/// One pooled worker and its running task, if any.
pub(super) struct WorkerSlot {
    pub(super) worker: Arc<dyn Worker>,
    cancel: Option<CancellationToken>,
    pub(super) handle: Option<JoinHandle<WorkerStats>>,
}

impl WorkerSlot {
    pub(super) fn new(worker: Arc<dyn Worker>) -> Self {
        Self {
            worker,
            cancel: None,
            handle: None,
        }
    }

    pub(super) fn id(&self) -> usize {
        self.worker.id()
    }

    /// Spawn the worker's task under a child of `run_token`.
    pub(super) fn start(&mut self, run_token: &CancellationToken) {
        let cancel = run_token.child_token();
        self.handle = Some(spawn_worker(Arc::clone(&self.worker), cancel.clone()));
        self.cancel = Some(cancel);
    }

    pub(super) fn cancel(&self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }
}

/// Collects the ids of workers that did not shut down cleanly.
#[derive(Debug, Default)]
pub(super) struct ShutdownReport {
    timed_out: Vec<usize>,
    failed: Vec<(usize, String)>,
}

impl ShutdownReport {
    /// Record a worker that missed the deadline. Each id is listed once even
    /// if both its task and its close timed out.
    pub(super) fn timed_out(&mut self, worker_id: usize) {
        if !self.timed_out.contains(&worker_id) {
            self.timed_out.push(worker_id);
        }
    }

    pub(super) fn failed(&mut self, worker_id: usize, reason: impl ToString) {
        self.failed.push((worker_id, reason.to_string()));
    }

    pub(super) fn into_result(self) -> Result<(), PoolError> {
        if self.timed_out.is_empty() && self.failed.is_empty() {
            Ok(())
        } else {
            Err(PoolError::Shutdown {
                timed_out: self.timed_out,
                failed: self.failed,
            })
        }
    }
}

/// Lock a mutex, recovering from poisoning if necessary.
///
/// If a thread panicked while holding the lock, logs a warning and recovers
/// the data so the pool stays usable.
pub(super) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("pool mutex poisoned (previous holder panicked), recovering");
            poisoned.into_inner()
        }
    }
}
