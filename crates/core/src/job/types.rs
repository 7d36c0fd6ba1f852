//! Job record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::failure::FailureClass;

/// Status of a job as recorded in the status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Returns the storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// One transcode request and its current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub input_location: String,
    pub output_location: String,
    pub status: JobStatus,
    /// Advisory; only a terminal status is authoritative.
    pub progress_percent: u8,
    /// Delivery attempt, starting at 1.
    pub attempt: u32,
    pub last_error: Option<String>,
    pub failure_class: Option<FailureClass>,
    /// The queue message has been acked, or nacked without requeue.
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Whether the job has reached a final status.
    ///
    /// A failed job whose message was requeued will be delivered again, so it
    /// is not terminal until the queue resolves it.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            JobStatus::Completed => true,
            JobStatus::Failed => self.resolved,
            JobStatus::Queued | JobStatus::Processing => false,
        }
    }

    /// Builds the terminal outcome, if the job has one.
    pub fn outcome(&self) -> Option<JobOutcome> {
        if !self.is_terminal() {
            return None;
        }
        match self.status {
            JobStatus::Completed => Some(JobOutcome::Completed {
                job_id: self.id.clone(),
                output_location: self.output_location.clone(),
            }),
            JobStatus::Failed => Some(JobOutcome::Failed {
                job_id: self.id.clone(),
                reason: self.last_error.clone().unwrap_or_default(),
                failure_class: self.failure_class.unwrap_or(FailureClass::Internal),
            }),
            _ => None,
        }
    }
}

/// Request to put a job on the queue.
///
/// Unknown fields are ignored so producers can attach their own metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueRequest {
    /// Caller-supplied id; a UUID is generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub input_location: String,
    pub output_location: String,
}

impl EnqueueRequest {
    pub fn new(input_location: impl Into<String>, output_location: impl Into<String>) -> Self {
        Self {
            id: None,
            input_location: input_location.into(),
            output_location: output_location.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Final result of a job, published once per terminal transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed {
        job_id: String,
        output_location: String,
    },
    Failed {
        job_id: String,
        reason: String,
        failure_class: FailureClass,
    },
}

impl JobOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Completed { job_id, .. } | Self::Failed { job_id, .. } => job_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Filter for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: JobStatus, resolved: bool) -> Job {
        let now = Utc::now();
        Job {
            id: "asset-1".to_string(),
            input_location: "/in/a.mov".to_string(),
            output_location: "/out/a.mp4".to_string(),
            status,
            progress_percent: 0,
            attempt: 1,
            last_error: None,
            failure_class: None,
            resolved,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn test_status_parse() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_requeued_failure_is_not_terminal() {
        assert!(!job(JobStatus::Failed, false).is_terminal());
        assert!(job(JobStatus::Failed, true).is_terminal());
        assert!(job(JobStatus::Completed, true).is_terminal());
        assert!(!job(JobStatus::Processing, false).is_terminal());
    }

    #[test]
    fn test_outcome_from_failed_job() {
        let mut failed = job(JobStatus::Failed, true);
        failed.last_error = Some("input not found".to_string());
        failed.failure_class = Some(FailureClass::Input);

        let outcome = failed.outcome().unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Failed {
                job_id: "asset-1".to_string(),
                reason: "input not found".to_string(),
                failure_class: FailureClass::Input,
            }
        );
        assert!(job(JobStatus::Queued, false).outcome().is_none());
    }

    #[test]
    fn test_enqueue_request_ignores_unknown_fields() {
        let req: EnqueueRequest = serde_json::from_str(
            r#"{"input_location":"/in/a.mov","output_location":"/out/a.mp4","uploader":"u1"}"#,
        )
        .unwrap();
        assert_eq!(req.id, None);
        assert_eq!(req.input_location, "/in/a.mov");
    }

    #[test]
    fn test_outcome_wire_format() {
        let outcome = JobOutcome::Completed {
            job_id: "asset-1".to_string(),
            output_location: "/out/a.mp4".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["output_location"], "/out/a.mp4");
    }
}
