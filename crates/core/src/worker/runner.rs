//! A single worker: dequeue, encode, record, repeat.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::config::WorkerConfig;
use super::types::{PoolStats, WorkerState, WorkerStatus};
use crate::encoder::{EncodeError, EncodeEvent, EncodeOutput, EncodeRequest, Encoder};
use crate::events::{EventBus, OutcomeNotifier};
use crate::failure::{Failure, RetryConfig};
use crate::job::{Job, JobOutcome};
use crate::metrics;
use crate::queue::{Delivery, Lease, QueueBackend};

/// Time a killed engine gets to exit before its task is dropped.
const KILL_GRACE: Duration = Duration::from_secs(10);

/// Lower bound on the lease heartbeat period.
const MIN_HEARTBEAT: Duration = Duration::from_millis(100);

/// Everything workers of one pool share.
pub(crate) struct WorkerContext {
    pub queue: Arc<dyn QueueBackend>,
    pub encoder: Arc<dyn Encoder>,
    pub config: WorkerConfig,
    pub retry: RetryConfig,
    pub lease_duration: Duration,
    pub events: EventBus,
    pub notifier: Option<Arc<dyn OutcomeNotifier>>,
    pub stats: Arc<PoolStats>,
    pub registry: Arc<RwLock<BTreeMap<usize, WorkerStatus>>>,
}

/// How an encode attempt ended.
enum Attempt {
    Finished(Result<EncodeOutput, EncodeError>, Lease),
    /// Another worker owns the job now; nothing may be recorded.
    LeaseLost,
}

/// Keeps the busy gauge honest even when the worker task is aborted mid-job.
struct BusyGuard;

impl BusyGuard {
    fn new() -> Self {
        metrics::BUSY_WORKERS.inc();
        Self
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        metrics::BUSY_WORKERS.dec();
    }
}

pub(crate) struct Worker {
    index: usize,
    id: String,
    ctx: Arc<WorkerContext>,
}

impl Worker {
    pub(crate) fn new(index: usize, ctx: Arc<WorkerContext>) -> Self {
        Self {
            index,
            id: format!("worker-{}", index + 1),
            ctx,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    /// Runs until the shutdown signal flips. The current job always finishes first.
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = %self.id, "Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let dequeued = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                result = self.ctx.queue.dequeue(&self.id, self.ctx.config.dequeue_wait()) => result,
            };

            match dequeued {
                Ok(Some(delivery)) => self.handle(delivery).await,
                Ok(None) => continue,
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Dequeue failed");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(self.ctx.config.error_backoff()) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    /// Drives one delivery to a recorded result.
    pub(crate) async fn handle(&self, delivery: Delivery) {
        let Delivery { job, lease } = delivery;
        let span = info_span!("job", job_id = %job.id, worker_id = %self.id, attempt = job.attempt);
        self.process(job, lease).instrument(span).await;
    }

    async fn process(&self, job: Job, lease: Lease) {
        let _busy = BusyGuard::new();
        self.set_state(WorkerState::Received, Some(&job)).await;
        self.ctx.events.started(&job.id, &self.id, job.attempt);
        info!(input = %job.input_location, "Job received");

        if job.attempt > self.ctx.retry.max_attempts {
            // Only reachable through redeliveries that never recorded a result
            let failure = Failure::transient(format!(
                "Gave up after {} deliveries without a recorded result",
                job.attempt - 1
            ));
            self.set_state(WorkerState::Resolving, Some(&job)).await;
            self.fail(&job, &lease, failure, false).await;
            self.set_state(WorkerState::Idle, None).await;
            return;
        }

        self.set_state(WorkerState::Encoding, Some(&job)).await;
        let started = Instant::now();
        let attempt = self.encode(&job, lease).await;
        self.set_state(WorkerState::Resolving, Some(&job)).await;

        match attempt {
            Attempt::Finished(Ok(output), lease) => {
                metrics::ENCODE_DURATION
                    .with_label_values(&["success"])
                    .observe(started.elapsed().as_secs_f64());
                self.succeed(&job, &lease, output).await;
            }
            Attempt::Finished(Err(err), lease) => {
                metrics::ENCODE_DURATION
                    .with_label_values(&["failed"])
                    .observe(started.elapsed().as_secs_f64());
                let failure = err.to_failure();
                let requeue = self.ctx.retry.should_retry(failure.class, job.attempt);
                self.fail(&job, &lease, failure, requeue).await;
            }
            Attempt::LeaseLost => {
                warn!("Lease lost during encode, leaving job to its new holder");
            }
        }

        self.set_state(WorkerState::Idle, None).await;
    }

    fn heartbeat_period(&self) -> Duration {
        (self.ctx.lease_duration / 3).max(MIN_HEARTBEAT)
    }

    async fn encode(&self, job: &Job, mut lease: Lease) -> Attempt {
        let mut handle = match self.ctx.encoder.start(EncodeRequest::from(job)).await {
            Ok(handle) => handle,
            Err(e) => return Attempt::Finished(Err(e), lease),
        };

        let max_duration = self.ctx.config.max_encode_duration();
        let deadline = tokio::time::sleep(max_duration);
        tokio::pin!(deadline);

        let period = self.heartbeat_period();
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_percent = 0u8;

        loop {
            tokio::select! {
                event = handle.next_event() => match event {
                    EncodeEvent::Progress(progress) => {
                        self.relay_progress(job, &lease, progress.percent, &mut last_percent);
                    }
                    EncodeEvent::Finished(result) => return Attempt::Finished(result, lease),
                },
                _ = heartbeat.tick() => match self.ctx.queue.extend_lease(&lease).await {
                    Ok(renewed) => {
                        debug!("Lease extended");
                        lease = renewed;
                    }
                    Err(e) if e.is_lease_lost() => {
                        handle.kill();
                        return Attempt::LeaseLost;
                    }
                    Err(e) => warn!(error = %e, "Failed to extend lease"),
                },
                _ = &mut deadline => {
                    warn!(
                        timeout_secs = max_duration.as_secs(),
                        "Encode exceeded maximum duration, killing engine"
                    );
                    handle.kill();
                    let _ = tokio::time::timeout(KILL_GRACE, handle.wait()).await;
                    return Attempt::Finished(
                        Err(EncodeError::Timeout {
                            timeout_secs: max_duration.as_secs(),
                        }),
                        lease,
                    );
                }
            }
        }
    }

    fn relay_progress(&self, job: &Job, lease: &Lease, percent: u8, last_percent: &mut u8) {
        if percent <= *last_percent {
            return;
        }
        *last_percent = percent;

        match self.ctx.queue.record_progress(lease, percent) {
            Ok(true) => {}
            Ok(false) => debug!("Progress not recorded, lease no longer matches"),
            Err(e) => warn!(error = %e, "Failed to record progress"),
        }
        debug!(progress = percent, "Encode progress");
        self.ctx.events.progress(&job.id, percent);
    }

    async fn succeed(&self, job: &Job, lease: &Lease, output: EncodeOutput) {
        match self.ctx.queue.mark_completed(lease, &job.output_location) {
            Ok(_) => {}
            Err(e) if e.is_lease_lost() => {
                warn!("Lease lost before completion was recorded");
                return;
            }
            Err(e) => {
                // The lease expires and a redelivery re-encodes over the same output
                error!(error = %e, "Failed to record completion");
                return;
            }
        }

        if let Err(e) = self.ctx.queue.ack(lease).await {
            warn!(error = %e, "Failed to ack completed job");
        }

        self.ctx.stats.record_completed();
        metrics::JOB_OUTCOMES
            .with_label_values(&["completed", "none"])
            .inc();
        info!(
            output = %output.output_path.display(),
            size_bytes = output.output_size_bytes,
            duration_ms = output.duration_ms,
            "Job completed"
        );

        self.publish_outcome(JobOutcome::Completed {
            job_id: job.id.clone(),
            output_location: job.output_location.clone(),
        });
    }

    async fn fail(&self, job: &Job, lease: &Lease, failure: Failure, requeue: bool) {
        if requeue {
            warn!(
                failure_class = %failure.class,
                reason = %failure.reason,
                "Attempt failed, requeueing"
            );
        } else {
            error!(
                failure_class = %failure.class,
                reason = %failure.reason,
                "Job failed"
            );
        }

        match self.ctx.queue.mark_failed(lease, &failure) {
            Ok(_) => {}
            Err(e) if e.is_lease_lost() => {
                warn!("Lease lost before failure was recorded");
                return;
            }
            Err(e) => {
                // Left leased; the lease expires and the job is redelivered
                error!(error = %e, "Failed to record failure");
                return;
            }
        }

        if let Err(e) = self.ctx.queue.nack(lease, requeue).await {
            warn!(error = %e, requeue, "Failed to nack job");
            if e.is_lease_lost() {
                return;
            }
        }

        if requeue {
            self.ctx.stats.record_retried();
            metrics::JOB_RETRIES
                .with_label_values(&[failure.class.as_str()])
                .inc();
            self.ctx
                .events
                .retrying(&job.id, job.attempt, failure.class, &failure.reason);
        } else {
            self.ctx.stats.record_failed();
            metrics::JOB_OUTCOMES
                .with_label_values(&["failed", failure.class.as_str()])
                .inc();
            self.publish_outcome(JobOutcome::Failed {
                job_id: job.id.clone(),
                reason: failure.reason,
                failure_class: failure.class,
            });
        }
    }

    fn publish_outcome(&self, outcome: JobOutcome) {
        self.ctx.events.outcome(outcome.clone());

        let Some(notifier) = self.ctx.notifier.clone() else {
            return;
        };
        tokio::spawn(async move {
            match notifier.notify(&outcome).await {
                Ok(()) => {
                    metrics::WEBHOOK_DELIVERIES
                        .with_label_values(&["success"])
                        .inc();
                }
                Err(e) => {
                    metrics::WEBHOOK_DELIVERIES.with_label_values(&["error"]).inc();
                    warn!(job_id = %outcome.job_id(), error = %e, "Failed to deliver outcome");
                }
            }
        });
    }

    async fn set_state(&self, state: WorkerState, job: Option<&Job>) {
        let status = WorkerStatus {
            worker_id: self.id.clone(),
            state,
            current_job: job.map(|j| j.id.clone()),
            attempt: job.map(|j| j.attempt),
        };
        self.ctx.registry.write().await.insert(self.index, status);
    }
}
