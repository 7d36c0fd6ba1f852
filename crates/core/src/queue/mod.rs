//! Durable job queue.
//!
//! [`JobQueue`] is the at-least-once delivery contract; [`JobStore`] is the
//! status table workers update while they hold a lease. [`SqliteJobQueue`]
//! implements both on a single SQLite table.

mod config;
mod error;
mod sqlite_queue;
mod traits;

pub use config::{DatabaseConfig, QueueConfig};
pub use error::QueueError;
pub use sqlite_queue::SqliteJobQueue;
pub use traits::{Delivery, JobQueue, JobStore, Lease, QueueBackend};
