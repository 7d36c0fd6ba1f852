//! Types for the worker pool.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Where a worker is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Waiting on the queue.
    Idle,
    /// Holding a delivery, not yet encoding.
    Received,
    /// Engine running.
    Encoding,
    /// Recording the result.
    Resolving,
}

/// Snapshot of a single worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub worker_id: String,
    pub state: WorkerState,
    pub current_job: Option<String>,
    pub attempt: Option<u32>,
}

impl WorkerStatus {
    pub fn idle(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            state: WorkerState::Idle,
            current_job: None,
            attempt: None,
        }
    }
}

/// Snapshot of the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Whether the pool is running.
    pub running: bool,
    /// Number of workers started.
    pub concurrency: usize,
    /// Workers currently holding a job.
    pub busy_workers: usize,
    pub workers: Vec<WorkerStatus>,
    /// Attempts resolved since startup (completed, failed, or requeued).
    pub total_processed: u64,
    pub total_completed: u64,
    /// Jobs that failed permanently.
    pub total_failed: u64,
    /// Attempts that failed and were requeued.
    pub total_retried: u64,
}

/// What shutdown had to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Workers that exited on their own.
    pub stopped: usize,
    /// Workers aborted at the deadline; their jobs will be redelivered.
    pub aborted: usize,
}

/// Errors from the worker pool.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker pool is already running")]
    AlreadyRunning,

    #[error("Concurrency must be at least 1")]
    InvalidConcurrency,
}

/// Counters shared by all workers of a pool.
#[derive(Debug, Default)]
pub(crate) struct PoolStats {
    total_processed: AtomicU64,
    total_completed: AtomicU64,
    total_failed: AtomicU64,
    total_retried: AtomicU64,
}

impl PoolStats {
    pub(crate) fn record_completed(&self) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        self.total_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        self.total_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retried(&self) {
        self.total_processed.fetch_add(1, Ordering::Relaxed);
        self.total_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn to_status(
        &self,
        running: bool,
        concurrency: usize,
        workers: Vec<WorkerStatus>,
    ) -> PoolStatus {
        PoolStatus {
            running,
            concurrency,
            busy_workers: workers.iter().filter(|w| w.current_job.is_some()).count(),
            workers,
            total_processed: self.total_processed.load(Ordering::Relaxed),
            total_completed: self.total_completed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            total_retried: self.total_retried.load(Ordering::Relaxed),
        }
    }
}
