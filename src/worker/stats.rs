//! Per-worker outcome tracking.

use std::time::{Duration, Instant};

use serde::Serialize;

use super::WorkerRole;

/// Outcome counts for a single worker run, returned when its task exits.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub worker_id: usize,
    pub role: WorkerRole,
    /// Operations that succeeded (sends for producers, receives for consumers).
    pub completed: u64,
    pub failed: u64,
    #[serde(skip)]
    started_at: Option<Instant>,
    #[serde(skip)]
    ended_at: Option<Instant>,
}

impl WorkerStats {
    pub fn new(worker_id: usize, role: WorkerRole) -> Self {
        Self {
            worker_id,
            role,
            completed: 0,
            failed: 0,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    pub fn record_success(&mut self) {
        self.completed += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn total(&self) -> u64 {
        self.completed + self.failed
    }

    /// Time between `start` and `stop`, or until now while still running.
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|start| {
            self.ended_at
                .map(|end| end.duration_since(start))
                .unwrap_or_else(|| start.elapsed())
        })
    }

    pub fn ops_per_second(&self) -> f64 {
        self.elapsed()
            .map(|d| {
                let secs = d.as_secs_f64();
                if secs > 0.0 {
                    self.completed as f64 / secs
                } else {
                    0.0
                }
            })
            .unwrap_or(0.0)
    }
}
