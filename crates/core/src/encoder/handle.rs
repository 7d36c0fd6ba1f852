//! Handle to a running encode.

use std::fmt;
use std::future::Future;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::error::EncodeError;
use super::types::{EncodeOutput, EncodeProgress};

/// Progress updates buffered per encode before new ones are dropped.
const PROGRESS_BUFFER: usize = 16;

/// Resolves when the handle asks the encode to stop, or when the handle is dropped.
pub type KillSignal = oneshot::Receiver<()>;

/// What a running encode produced next.
#[derive(Debug)]
pub enum EncodeEvent {
    Progress(EncodeProgress),
    Finished(Result<EncodeOutput, EncodeError>),
}

/// A running encode.
///
/// Dropping the handle aborts the encode task, which kills the engine and
/// removes its partial output.
pub struct EncodeHandle {
    job_id: String,
    progress_rx: mpsc::Receiver<EncodeProgress>,
    kill_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<EncodeOutput, EncodeError>>>,
}

impl EncodeHandle {
    /// Spawns `run` on the runtime.
    ///
    /// `run` receives the progress sender (send with `try_send`, progress is
    /// best-effort) and the kill signal it must honour.
    pub fn spawn<F, Fut>(job_id: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(mpsc::Sender<EncodeProgress>, KillSignal) -> Fut,
        Fut: Future<Output = Result<EncodeOutput, EncodeError>> + Send + 'static,
    {
        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_BUFFER);
        let (kill_tx, kill_rx) = oneshot::channel();
        let task = tokio::spawn(run(progress_tx, kill_rx));

        Self {
            job_id: job_id.into(),
            progress_rx,
            kill_tx: Some(kill_tx),
            task: Some(task),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Next progress update; `None` once the encode has stopped reporting.
    pub async fn next_progress(&mut self) -> Option<EncodeProgress> {
        self.progress_rx.recv().await
    }

    /// Waits for the next progress update or the final result.
    ///
    /// Buffered progress is drained before the result is returned. Cancel safe.
    pub async fn next_event(&mut self) -> EncodeEvent {
        let Some(task) = self.task.as_mut() else {
            return EncodeEvent::Finished(Err(EncodeError::TaskFailed {
                reason: "encode result already taken".to_string(),
            }));
        };

        let joined = tokio::select! {
            biased;
            Some(progress) = self.progress_rx.recv() => return EncodeEvent::Progress(progress),
            joined = task => joined,
        };
        self.task = None;

        EncodeEvent::Finished(match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(EncodeError::Killed),
            Err(e) => Err(EncodeError::TaskFailed {
                reason: e.to_string(),
            }),
        })
    }

    /// Waits for the encode to finish, discarding progress.
    pub async fn wait(mut self) -> Result<EncodeOutput, EncodeError> {
        loop {
            if let EncodeEvent::Finished(result) = self.next_event().await {
                return result;
            }
        }
    }

    /// Asks the engine to terminate. The result resolves to `Killed`.
    pub fn kill(&mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }
}

impl fmt::Debug for EncodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodeHandle")
            .field("job_id", &self.job_id)
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

impl Drop for EncodeHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn output(job_id: &str) -> EncodeOutput {
        EncodeOutput {
            job_id: job_id.to_string(),
            output_location: "/out/a.mp4".to_string(),
            output_path: PathBuf::from("/out/a.mp4"),
            output_size_bytes: 1024,
            duration_ms: 5,
        }
    }

    fn progress(percent: u8) -> EncodeProgress {
        EncodeProgress {
            job_id: "job-1".to_string(),
            percent,
            out_time_secs: 0.0,
            speed: None,
        }
    }

    #[tokio::test]
    async fn test_progress_then_result() {
        let mut handle = EncodeHandle::spawn("job-1", |tx, _kill| async move {
            for percent in [10, 50, 90] {
                let _ = tx.try_send(progress(percent));
            }
            Ok(output("job-1"))
        });

        let mut seen = Vec::new();
        loop {
            match handle.next_event().await {
                EncodeEvent::Progress(p) => seen.push(p.percent),
                EncodeEvent::Finished(result) => {
                    assert_eq!(result.unwrap().output_size_bytes, 1024);
                    break;
                }
            }
        }
        assert_eq!(seen, vec![10, 50, 90]);
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_kill_resolves_killed() {
        let mut handle = EncodeHandle::spawn("job-1", |_tx, kill| async move {
            tokio::select! {
                _ = kill => Err(EncodeError::Killed),
                _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(output("job-1")),
            }
        });

        handle.kill();
        let result = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap();
        assert!(matches!(result, Err(EncodeError::Killed)));
    }

    #[tokio::test]
    async fn test_debug_names_the_job() {
        let handle = EncodeHandle::spawn("job-7", |_tx, _kill| async move { Ok(output("job-7")) });
        let result: Result<EncodeHandle, EncodeError> = Ok(handle);

        let formatted = format!("{:?}", result);
        assert!(formatted.contains("EncodeHandle"));
        assert!(formatted.contains("job-7"));
    }

    #[tokio::test]
    async fn test_drop_aborts_task() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let handle = EncodeHandle::spawn("job-1", move |_tx, _kill| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(output("job-1"))
        });
        drop(handle);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }
}
