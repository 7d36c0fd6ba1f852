//! Testing utilities and mock implementations.
//!
//! Provides a scriptable [`MockEncoder`] so the worker pool, queue and API can
//! be exercised end to end without an ffmpeg binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use reelpress_core::testing::{fixtures, MockEncoder};
//!
//! let encoder = MockEncoder::new();
//! encoder.set_progress_steps(vec![10, 50, 90]).await;
//!
//! let queue = fixtures::memory_queue(fixtures::fast_queue_config(5), RetryConfig::immediate(3));
//! queue.enqueue(fixtures::enqueue_request("job-1")).await?;
//! ```

mod mock_encoder;

pub use mock_encoder::{MockEncoder, MockOutcome};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::failure::RetryConfig;
    use crate::job::EnqueueRequest;
    use crate::queue::{QueueConfig, SqliteJobQueue};

    /// Request with an id and throwaway locations.
    pub fn enqueue_request(id: &str) -> EnqueueRequest {
        EnqueueRequest::new(format!("/media/in/{}.mov", id), format!("/media/out/{}.mp4", id))
            .with_id(id)
    }

    /// Request whose output lands inside `dir`.
    pub fn enqueue_request_in(dir: &Path, id: &str) -> EnqueueRequest {
        let input = dir.join(format!("{}.mov", id));
        let output = dir.join(format!("{}.mp4", id));
        EnqueueRequest::new(input.display().to_string(), output.display().to_string()).with_id(id)
    }

    /// Queue config that polls fast and leases for `visibility_secs`.
    pub fn fast_queue_config(visibility_secs: u64) -> QueueConfig {
        QueueConfig::default()
            .with_visibility_timeout(visibility_secs)
            .with_poll_interval(20)
    }

    /// In-memory queue with the given config and retry policy.
    pub fn memory_queue(config: QueueConfig, retry: RetryConfig) -> SqliteJobQueue {
        SqliteJobQueue::in_memory(config)
            .expect("failed to open in-memory queue")
            .with_retry(retry)
    }
}
