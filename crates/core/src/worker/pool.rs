//! Worker pool: owns N workers sharing one queue and one encoder.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::config::WorkerConfig;
use super::runner::{Worker, WorkerContext};
use super::types::{PoolStats, PoolStatus, ShutdownReport, WorkerError, WorkerStatus};
use crate::encoder::Encoder;
use crate::events::{EventBus, OutcomeNotifier};
use crate::failure::RetryConfig;
use crate::queue::QueueBackend;

/// Pool of workers consuming transcode jobs.
///
/// Each worker runs one job at a time; `concurrency` workers run in parallel.
/// Shutdown stops dequeueing, lets in-flight jobs finish up to a deadline and
/// aborts whatever is left. Aborted jobs keep their lease and are redelivered
/// once it expires.
pub struct WorkerPool {
    config: WorkerConfig,
    queue: Arc<dyn QueueBackend>,
    encoder: Arc<dyn Encoder>,
    retry: RetryConfig,
    lease_duration: Duration,
    events: EventBus,
    notifier: Option<Arc<dyn OutcomeNotifier>>,

    // Runtime state
    running: AtomicBool,
    concurrency: AtomicUsize,
    stats: Arc<PoolStats>,
    registry: Arc<RwLock<BTreeMap<usize, WorkerStatus>>>,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    /// Create a pool. Workers are not started until [`WorkerPool::start`].
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn QueueBackend>,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config,
            queue,
            encoder,
            retry: RetryConfig::default(),
            lease_duration: Duration::from_secs(300),
            events: EventBus::default(),
            notifier: None,
            running: AtomicBool::new(false),
            concurrency: AtomicUsize::new(0),
            stats: Arc::new(PoolStats::default()),
            registry: Arc::new(RwLock::new(BTreeMap::new())),
            handles: Mutex::new(Vec::new()),
            shutdown_tx,
        }
    }

    /// Retry policy used to decide whether a failed attempt is requeued.
    /// Should match the queue's own retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Lease duration of the queue; heartbeats renew at a third of it.
    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn OutcomeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn `concurrency` workers.
    pub async fn start(&self, concurrency: usize) -> Result<(), WorkerError> {
        if concurrency == 0 {
            return Err(WorkerError::InvalidConcurrency);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::AlreadyRunning);
        }

        info!(concurrency, encoder = self.encoder.name(), "Starting worker pool");

        self.shutdown_tx.send_replace(false);
        self.concurrency.store(concurrency, Ordering::SeqCst);

        let ctx = Arc::new(WorkerContext {
            queue: Arc::clone(&self.queue),
            encoder: Arc::clone(&self.encoder),
            config: self.config.clone(),
            retry: self.retry.clone(),
            lease_duration: self.lease_duration,
            events: self.events.clone(),
            notifier: self.notifier.clone(),
            stats: Arc::clone(&self.stats),
            registry: Arc::clone(&self.registry),
        });

        let mut handles = self.handles.lock().await;
        let mut registry = self.registry.write().await;
        for index in 0..concurrency {
            let worker = Worker::new(index, Arc::clone(&ctx));
            let worker_id = worker.id().to_string();
            registry.insert(index, WorkerStatus::idle(worker_id.clone()));

            let shutdown_rx = self.shutdown_tx.subscribe();
            handles.push((worker_id, tokio::spawn(worker.run(shutdown_rx))));
        }

        info!("Worker pool started");
        Ok(())
    }

    /// Stop dequeueing and wait up to `timeout` for in-flight jobs.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        if !self.running.swap(false, Ordering::SeqCst) {
            return ShutdownReport::default();
        }

        info!(timeout_secs = timeout.as_secs(), "Stopping worker pool");
        self.shutdown_tx.send_replace(true);

        let deadline = tokio::time::Instant::now() + timeout;
        let handles = std::mem::take(&mut *self.handles.lock().await);
        let mut report = ShutdownReport::default();

        for (worker_id, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.stopped += 1,
                Ok(Err(e)) => {
                    warn!(worker_id = %worker_id, error = %e, "Worker task failed");
                    report.stopped += 1;
                }
                Err(_) => {
                    warn!(worker_id = %worker_id, "Worker did not stop in time, aborting");
                    handle.abort();
                    let _ = handle.await;
                    report.aborted += 1;
                }
            }
        }

        self.registry.write().await.clear();
        self.concurrency.store(0, Ordering::SeqCst);

        info!(
            stopped = report.stopped,
            aborted = report.aborted,
            "Worker pool stopped"
        );
        report
    }

    /// Current pool status.
    pub async fn status(&self) -> PoolStatus {
        let workers: Vec<WorkerStatus> = self.registry.read().await.values().cloned().collect();
        self.stats.to_status(
            self.is_running(),
            self.concurrency.load(Ordering::SeqCst),
            workers,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{QueueConfig, SqliteJobQueue};
    use crate::testing::MockEncoder;

    fn pool() -> WorkerPool {
        let queue = Arc::new(SqliteJobQueue::in_memory(QueueConfig::default()).unwrap());
        WorkerPool::new(
            WorkerConfig::default().with_dequeue_wait_ms(50),
            queue,
            Arc::new(MockEncoder::new()),
        )
    }

    #[tokio::test]
    async fn test_start_rejects_zero_concurrency() {
        let pool = pool();
        assert!(matches!(
            pool.start(0).await,
            Err(WorkerError::InvalidConcurrency)
        ));
        assert!(!pool.is_running());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let pool = pool();
        pool.start(2).await.unwrap();
        assert!(matches!(pool.start(1).await, Err(WorkerError::AlreadyRunning)));

        let status = pool.status().await;
        assert!(status.running);
        assert_eq!(status.concurrency, 2);
        assert_eq!(status.workers.len(), 2);
        assert_eq!(status.workers[0].worker_id, "worker-1");

        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_idle_shutdown_is_clean() {
        let pool = pool();
        pool.start(3).await.unwrap();

        let report = pool.shutdown(Duration::from_secs(2)).await;
        assert_eq!(report, ShutdownReport { stopped: 3, aborted: 0 });

        let status = pool.status().await;
        assert!(!status.running);
        assert!(status.workers.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_when_not_running() {
        let pool = pool();
        assert_eq!(pool.shutdown(Duration::from_secs(1)).await, ShutdownReport::default());
    }

    #[tokio::test]
    async fn test_restart_after_shutdown() {
        let pool = pool();
        pool.start(1).await.unwrap();
        pool.shutdown(Duration::from_secs(1)).await;
        pool.start(1).await.unwrap();
        assert!(pool.is_running());
        pool.shutdown(Duration::from_secs(1)).await;
    }
}
