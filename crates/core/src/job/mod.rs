//! Job records: the unit of transcode work and its terminal outcome.

mod types;

pub use types::{EnqueueRequest, Job, JobFilter, JobOutcome, JobStatus};
