pub mod config;
pub mod encoder;
pub mod events;
pub mod failure;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod testing;
pub mod worker;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LoggingConfig,
    SanitizedConfig, ServerConfig,
};
pub use encoder::{
    EncodeError, EncodeHandle, EncodeOutput, EncodeProgress, EncodeRequest, Encoder,
    EncoderConfig, FfmpegEncoder, MediaInfo, MediaLocation, OutputProfile,
};
pub use events::{
    EventBus, JobEvent, NotifierConfig, NotifyError, OutcomeNotifier, WebhookNotifier,
};
pub use failure::{Failure, FailureClass, RetryConfig};
pub use job::{EnqueueRequest, Job, JobFilter, JobOutcome, JobStatus};
pub use queue::{
    DatabaseConfig, Delivery, JobQueue, JobStore, Lease, QueueBackend, QueueConfig, QueueError,
    SqliteJobQueue,
};
pub use worker::{
    PoolStatus, ShutdownReport, WorkerConfig, WorkerError, WorkerPool, WorkerState, WorkerStatus,
};
