//! Configuration for the worker pool.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of workers, each encoding one job at a time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Maximum wall-clock time for one encode in seconds.
    #[serde(default = "default_max_encode")]
    pub max_encode_secs: u64,

    /// How long shutdown waits for in-flight jobs in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Long-poll duration of each dequeue in milliseconds.
    #[serde(default = "default_dequeue_wait")]
    pub dequeue_wait_ms: u64,

    /// Pause after a queue error before dequeueing again, in milliseconds.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,
}

fn default_concurrency() -> usize {
    1
}

fn default_max_encode() -> u64 {
    3600 // 1 hour
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_dequeue_wait() -> u64 {
    5000
}

fn default_error_backoff() -> u64 {
    1000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_encode_secs: default_max_encode(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            dequeue_wait_ms: default_dequeue_wait(),
            error_backoff_ms: default_error_backoff(),
        }
    }
}

impl WorkerConfig {
    /// Sets the number of workers.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the maximum encode duration.
    pub fn with_max_encode_secs(mut self, secs: u64) -> Self {
        self.max_encode_secs = secs;
        self
    }

    /// Sets the dequeue long-poll duration.
    pub fn with_dequeue_wait_ms(mut self, ms: u64) -> Self {
        self.dequeue_wait_ms = ms;
        self
    }

    pub fn max_encode_duration(&self) -> Duration {
        Duration::from_secs(self.max_encode_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn dequeue_wait(&self) -> Duration {
        Duration::from_millis(self.dequeue_wait_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}
