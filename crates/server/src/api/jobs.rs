//! Job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use reelpress_core::{
    EnqueueRequest, FailureClass, Job, JobFilter, JobOutcome, JobStatus, QueueError,
};

use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: usize = 1000;

/// Default limit for job queries
const DEFAULT_LIMIT: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by status
    pub status: Option<String>,
    /// Maximum number of jobs to return
    pub limit: Option<usize>,
    /// Pagination offset
    pub offset: Option<usize>,
}

/// Response for job operations
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub input_location: String,
    pub output_location: String,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_class: Option<FailureClass>,
    /// Present once the job is terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        let outcome = job.outcome();
        Self {
            id: job.id,
            input_location: job.input_location,
            output_location: job.output_location,
            status: job.status,
            progress_percent: job.progress_percent,
            attempt: job.attempt,
            last_error: job.last_error,
            failure_class: job.failure_class,
            outcome,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobResponse>,
    pub total: i64,
    pub limit: usize,
    pub offset: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> (StatusCode, Json<JobErrorResponse>) {
    (
        status,
        Json(JobErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn queue_error_status(err: &QueueError) -> StatusCode {
    match err {
        QueueError::Duplicate(_) => StatusCode::CONFLICT,
        QueueError::Invalid(_) => StatusCode::BAD_REQUEST,
        QueueError::NotFound(_) => StatusCode::NOT_FOUND,
        QueueError::LeaseLost { .. } | QueueError::Database(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Enqueue a new job
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<JobResponse>), impl IntoResponse> {
    match state.queue().enqueue(body).await {
        Ok(job) => {
            info!(job_id = %job.id, input = %job.input_location, "Job enqueued");
            Ok((StatusCode::CREATED, Json(JobResponse::from(job))))
        }
        Err(e) => Err(error_response(queue_error_status(&e), e)),
    }
}

/// Get a job by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, impl IntoResponse> {
    match state.queue().get(&id) {
        Ok(Some(job)) => Ok(Json(JobResponse::from(job))),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Job not found: {}", id),
        )),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}

/// List jobs with optional status filter, newest first
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0);

    let mut count_filter = JobFilter::new();
    if let Some(ref status) = params.status {
        match status.parse::<JobStatus>() {
            Ok(status) => count_filter = count_filter.with_status(status),
            Err(e) => return Err(error_response(StatusCode::BAD_REQUEST, e)),
        }
    }
    let filter = count_filter.clone().with_limit(limit).with_offset(offset);

    let jobs = match state.queue().list(&filter) {
        Ok(jobs) => jobs,
        Err(e) => return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    };

    let total = match state.queue().count(&count_filter) {
        Ok(count) => count,
        Err(e) => return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    };

    Ok(Json(ListJobsResponse {
        jobs: jobs.into_iter().map(JobResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}
