use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::worker::{Worker, WorkerStats};

/// Spawn a task running `worker` until `cancel` fires or its budget elapses.
///
/// This is a free function so the pool can spawn while holding its state
/// lock without borrowing `self`.
pub(super) fn spawn_worker(
    worker: Arc<dyn Worker>,
    cancel: CancellationToken,
) -> JoinHandle<WorkerStats> {
    tokio::spawn(async move {
        let worker_id = worker.id();
        let role = worker.role();
        debug!(worker_id, %role, "worker task starting");

        let stats = worker.run(cancel).await;

        debug!(
            worker_id,
            %role,
            completed = stats.completed,
            failed = stats.failed,
            ops_per_sec = stats.ops_per_second(),
            elapsed_ms = ?stats.elapsed().map(|d| d.as_millis()),
            "worker task exited"
        );
        stats
    })
}
