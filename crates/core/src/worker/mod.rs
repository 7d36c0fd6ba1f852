//! Worker pool that consumes the job queue and drives the encoder.

mod config;
mod pool;
mod runner;
mod types;

pub use config::WorkerConfig;
pub use pool::WorkerPool;
pub use types::{PoolStatus, ShutdownReport, WorkerError, WorkerState, WorkerStatus};
