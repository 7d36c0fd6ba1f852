//! Error types for the queue module.

use thiserror::Error;

/// Errors returned by the job queue and status store.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A job with this id already exists.
    #[error("Job already exists: {0}")]
    Duplicate(String),

    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// The lease no longer matches; the job was redelivered or resolved.
    #[error("Lease lost for job {job_id}")]
    LeaseLost { job_id: String },

    /// The enqueue request is malformed.
    #[error("Invalid job: {0}")]
    Invalid(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl QueueError {
    pub fn lease_lost(job_id: impl Into<String>) -> Self {
        Self::LeaseLost {
            job_id: job_id.into(),
        }
    }

    pub fn is_lease_lost(&self) -> bool {
        matches!(self, Self::LeaseLost { .. })
    }
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}
