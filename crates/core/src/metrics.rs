//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Queue (enqueues, deliveries, lease expiries)
//! - Workers (outcomes, retries, encode duration, busy workers)
//! - Events (published events, dropped progress, webhook deliveries)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Queue Metrics
// =============================================================================

/// Jobs enqueued total.
pub static JOBS_ENQUEUED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("reelpress_jobs_enqueued_total", "Total jobs enqueued").unwrap()
});

/// Deliveries handed to workers, including redeliveries.
pub static JOBS_DEQUEUED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("reelpress_jobs_dequeued_total", "Total job deliveries").unwrap()
});

/// Jobs redelivered because their lease expired.
pub static LEASE_EXPIRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "reelpress_lease_expiries_total",
        "Total jobs redelivered after lease expiry",
    )
    .unwrap()
});

// =============================================================================
// Worker Metrics
// =============================================================================

/// Terminal outcomes by result and failure class.
pub static JOB_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelpress_job_outcomes_total", "Total terminal job outcomes"),
        &["result", "failure_class"], // "completed"/"failed", class or "none"
    )
    .unwrap()
});

/// Requeued attempts by failure class.
pub static JOB_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelpress_job_retries_total", "Total requeued job attempts"),
        &["failure_class"],
    )
    .unwrap()
});

/// Encode duration in seconds.
pub static ENCODE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "reelpress_encode_duration_seconds",
            "Duration of encode attempts",
        )
        .buckets(vec![
            1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
        ]),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Workers currently holding a job.
pub static BUSY_WORKERS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("reelpress_busy_workers", "Workers currently encoding a job").unwrap()
});

// =============================================================================
// Event Metrics
// =============================================================================

/// Events published on the bus.
pub static EVENTS_PUBLISHED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("reelpress_events_published_total", "Total job events published").unwrap()
});

/// Progress updates dropped because the consumer was behind.
pub static PROGRESS_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "reelpress_progress_dropped_total",
        "Total progress updates dropped under backpressure",
    )
    .unwrap()
});

/// Webhook deliveries by result.
pub static WEBHOOK_DELIVERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelpress_webhook_deliveries_total",
            "Total outcome webhook deliveries",
        ),
        &["result"], // "success", "error"
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Queue
        Box::new(JOBS_ENQUEUED.clone()),
        Box::new(JOBS_DEQUEUED.clone()),
        Box::new(LEASE_EXPIRIES.clone()),
        // Workers
        Box::new(JOB_OUTCOMES.clone()),
        Box::new(JOB_RETRIES.clone()),
        Box::new(ENCODE_DURATION.clone()),
        Box::new(BUSY_WORKERS.clone()),
        // Events
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(PROGRESS_DROPPED.clone()),
        Box::new(WEBHOOK_DELIVERIES.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        JOB_OUTCOMES.with_label_values(&["failed", "input"]).inc();
        assert!(registry
            .gather()
            .iter()
            .any(|family| family.get_name() == "reelpress_job_outcomes_total"));
    }
}
