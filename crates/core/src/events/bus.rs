//! In-process broadcast of job events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::failure::FailureClass;
use crate::job::JobOutcome;
use crate::metrics;

/// Something observable happened to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A worker picked up a delivery.
    Started {
        job_id: String,
        worker_id: String,
        attempt: u32,
    },
    /// Advisory encode progress.
    Progress { job_id: String, progress_percent: u8 },
    /// An attempt failed and the job was requeued.
    Retrying {
        job_id: String,
        attempt: u32,
        failure_class: FailureClass,
        reason: String,
    },
    /// The job reached a terminal status.
    Outcome { outcome: JobOutcome },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Started { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Retrying { job_id, .. } => job_id,
            Self::Outcome { outcome } => outcome.job_id(),
        }
    }
}

/// Lossy fan-out of job events.
///
/// Slow subscribers lose the oldest events rather than slowing workers down.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: JobEvent) {
        // Send errors just mean no one is listening
        let _ = self.sender.send(event);
        metrics::EVENTS_PUBLISHED.inc();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn started(&self, job_id: &str, worker_id: &str, attempt: u32) {
        self.publish(JobEvent::Started {
            job_id: job_id.to_string(),
            worker_id: worker_id.to_string(),
            attempt,
        });
    }

    pub fn progress(&self, job_id: &str, progress_percent: u8) {
        self.publish(JobEvent::Progress {
            job_id: job_id.to_string(),
            progress_percent,
        });
    }

    pub fn retrying(&self, job_id: &str, attempt: u32, failure_class: FailureClass, reason: &str) {
        self.publish(JobEvent::Retrying {
            job_id: job_id.to_string(),
            attempt,
            failure_class,
            reason: reason.to_string(),
        });
    }

    pub fn outcome(&self, outcome: JobOutcome) {
        self.publish(JobEvent::Outcome { outcome });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.progress("job-1", 42);
        bus.outcome(JobOutcome::Completed {
            job_id: "job-1".to_string(),
            output_location: "/out/a.mp4".to_string(),
        });

        assert_eq!(
            rx.recv().await.unwrap(),
            JobEvent::Progress {
                job_id: "job-1".to_string(),
                progress_percent: 42
            }
        );
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, JobEvent::Outcome { ref outcome } if outcome.is_success()));
        assert_eq!(event.job_id(), "job-1");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.progress("job-1", 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for percent in 0..5 {
            bus.progress("job-1", percent);
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(3))));
        assert!(matches!(
            rx.recv().await.unwrap(),
            JobEvent::Progress { progress_percent: 3, .. }
        ));
    }

    #[test]
    fn test_event_wire_format() {
        let event = JobEvent::Progress {
            job_id: "job-1".to_string(),
            progress_percent: 7,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["progress_percent"], 7);
    }
}
