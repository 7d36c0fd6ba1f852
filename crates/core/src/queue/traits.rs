//! Trait definitions for the queue module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use super::error::QueueError;
use crate::failure::Failure;
use crate::job::{EnqueueRequest, Job, JobFilter};

/// Temporary ownership of a delivered job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub job_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// A job handed to a worker together with its lease.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job: Job,
    pub lease: Lease,
}

/// Durable at-least-once job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Adds a job in the `Queued` state.
    async fn enqueue(&self, request: EnqueueRequest) -> Result<Job, QueueError>;

    /// Waits up to `wait` for a job and leases it to `worker_id`.
    async fn dequeue(&self, worker_id: &str, wait: Duration)
        -> Result<Option<Delivery>, QueueError>;

    /// Resolves the message.
    async fn ack(&self, lease: &Lease) -> Result<(), QueueError>;

    /// Releases the lease, either requeueing the message after a backoff or
    /// resolving it.
    async fn nack(&self, lease: &Lease, requeue: bool) -> Result<(), QueueError>;

    /// Pushes the lease expiry out by the visibility timeout.
    async fn extend_lease(&self, lease: &Lease) -> Result<Lease, QueueError>;
}

/// Status table behind the queue. Mutations require the current lease.
pub trait JobStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Job>, QueueError>;

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError>;

    fn count(&self, filter: &JobFilter) -> Result<i64, QueueError>;

    /// Raises the progress of the leased job; never lowers it.
    ///
    /// Returns `false` when the lease no longer matches.
    fn record_progress(&self, lease: &Lease, percent: u8) -> Result<bool, QueueError>;

    fn mark_completed(&self, lease: &Lease, output_location: &str) -> Result<Job, QueueError>;

    fn mark_failed(&self, lease: &Lease, failure: &Failure) -> Result<Job, QueueError>;
}

/// A queue that also owns its status table.
pub trait QueueBackend: JobQueue + JobStore {}

impl<T: JobQueue + JobStore> QueueBackend for T {}
