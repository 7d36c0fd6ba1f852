//! Mock encoder for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, RwLock};

use crate::encoder::{
    EncodeError, EncodeHandle, EncodeOutput, EncodeProgress, EncodeRequest, Encoder, KillSignal,
    MediaInfo, MediaLocation, PartialFile,
};
use crate::failure::FailureClass;

/// What the next encode started on a [`MockEncoder`] does.
#[derive(Debug)]
pub enum MockOutcome {
    /// Report the configured progress steps, then succeed.
    Success,
    /// Fail in `start` before any engine runs.
    StartError(EncodeError),
    /// Report progress, then fail with this error.
    Fail(EncodeError),
    /// Report progress, then die as if killed by a signal.
    Crash { signal: Option<i32> },
    /// Never finish on its own; only a kill ends it.
    Hang,
}

/// Mock implementation of the Encoder trait.
///
/// Provides controllable behavior for testing:
/// - Script per-encode outcomes (success, failure by class, crash, hang)
/// - Emit progress steps spread over a simulated encode duration
/// - Optionally write real output files through a partial file
/// - Track started and killed jobs and peak concurrency
///
/// # Example
///
/// ```rust,ignore
/// use reelpress_core::testing::{MockEncoder, MockOutcome};
///
/// let encoder = MockEncoder::new();
/// encoder.set_progress_steps(vec![25, 50, 75]).await;
/// encoder.set_next_outcome(MockOutcome::Crash { signal: Some(9) }).await;
///
/// // Run workers against it...
///
/// assert_eq!(encoder.started_jobs().await.len(), 1);
/// ```
#[derive(Debug)]
pub struct MockEncoder {
    outcomes: Arc<RwLock<VecDeque<MockOutcome>>>,
    progress_steps: Arc<RwLock<Vec<u8>>>,
    encode_duration_ms: Arc<RwLock<u64>>,
    /// Write the output file on success, and a partial file while running.
    write_output: Arc<RwLock<bool>>,
    started: Arc<RwLock<Vec<EncodeRequest>>>,
    killed: Arc<RwLock<Vec<String>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl Default for MockEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEncoder {
    pub fn new() -> Self {
        Self {
            outcomes: Arc::new(RwLock::new(VecDeque::new())),
            progress_steps: Arc::new(RwLock::new(Vec::new())),
            encode_duration_ms: Arc::new(RwLock::new(0)),
            write_output: Arc::new(RwLock::new(false)),
            started: Arc::new(RwLock::new(Vec::new())),
            killed: Arc::new(RwLock::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue an outcome. Encodes with nothing queued succeed.
    pub async fn set_next_outcome(&self, outcome: MockOutcome) {
        self.outcomes.write().await.push_back(outcome);
    }

    /// Fail the next encode with an engine error of the given class.
    pub async fn fail_next(&self, class: FailureClass, reason: &str) {
        self.set_next_outcome(MockOutcome::Fail(EncodeError::engine_failed(
            class, reason, None,
        )))
        .await;
    }

    pub async fn set_progress_steps(&self, steps: Vec<u8>) {
        *self.progress_steps.write().await = steps;
    }

    /// Total simulated encode time, spread evenly between progress steps.
    pub async fn set_encode_duration(&self, duration: Duration) {
        *self.encode_duration_ms.write().await = duration.as_millis() as u64;
    }

    pub async fn set_write_output(&self, write: bool) {
        *self.write_output.write().await = write;
    }

    /// Job ids in the order their encodes started.
    pub async fn started_jobs(&self) -> Vec<String> {
        self.started
            .read()
            .await
            .iter()
            .map(|r| r.job_id.clone())
            .collect()
    }

    pub async fn recorded_requests(&self) -> Vec<EncodeRequest> {
        self.started.read().await.clone()
    }

    /// Job ids whose encode ended through a kill.
    pub async fn killed_jobs(&self) -> Vec<String> {
        self.killed.read().await.clone()
    }

    /// Highest number of encodes that ran at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn take_outcome(&self) -> MockOutcome {
        self.outcomes
            .write()
            .await
            .pop_front()
            .unwrap_or(MockOutcome::Success)
    }
}

/// Decrements the active counter when the encode task ends or is aborted.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MockRun {
    request: EncodeRequest,
    outcome: MockOutcome,
    steps: Vec<u8>,
    duration: Duration,
    write_output: bool,
    killed: Arc<RwLock<Vec<String>>>,
    _active: ActiveGuard,
}

impl MockRun {
    async fn run(
        self,
        progress_tx: mpsc::Sender<EncodeProgress>,
        mut kill_rx: KillSignal,
    ) -> Result<EncodeOutput, EncodeError> {
        let started = Instant::now();
        let job_id = self.request.job_id.clone();

        let output_path = if self.write_output {
            Some(MediaLocation::parse_output(&self.request.output_location)?)
        } else {
            None
        };
        let partial = match &output_path {
            Some(path) => {
                let partial = PartialFile::for_output(path, &job_id, self.request.attempt);
                tokio::fs::write(partial.path(), b"partial")
                    .await
                    .map_err(|e| EncodeError::output_unwritable(partial.path(), e))?;
                Some(partial)
            }
            None => None,
        };

        let slices = self.steps.len() as u32 + 1;
        let step_delay = self.duration / slices;

        for percent in &self.steps {
            tokio::select! {
                _ = &mut kill_rx => return self.killed(&job_id).await,
                _ = tokio::time::sleep(step_delay) => {}
            }
            let _ = progress_tx.try_send(EncodeProgress {
                job_id: job_id.clone(),
                percent: *percent,
                out_time_secs: 0.0,
                speed: None,
            });
        }

        if matches!(self.outcome, MockOutcome::Hang) {
            let _ = (&mut kill_rx).await;
            return self.killed(&job_id).await;
        }

        tokio::select! {
            _ = &mut kill_rx => return self.killed(&job_id).await,
            _ = tokio::time::sleep(step_delay) => {}
        }

        match self.outcome {
            MockOutcome::Fail(err) => Err(err),
            MockOutcome::Crash { signal } => Err(EncodeError::Crashed {
                signal,
                diagnostics: Some("mock engine crashed".to_string()),
            }),
            _ => {
                let mut output_size_bytes = 0;
                let path = match (output_path, partial) {
                    (Some(path), Some(partial)) => {
                        // Writes through the existing partial like a running engine
                        let mut file = tokio::fs::OpenOptions::new()
                            .write(true)
                            .truncate(true)
                            .open(partial.path())
                            .await
                            .map_err(|e| EncodeError::output_unwritable(partial.path(), e))?;
                        file.write_all(b"mock encoded output").await?;
                        file.flush().await?;
                        drop(file);
                        output_size_bytes = tokio::fs::metadata(partial.path()).await?.len();
                        partial
                            .persist(&path)
                            .await
                            .map_err(|e| EncodeError::output_unwritable(&path, e))?;
                        path
                    }
                    _ => self.request.output_location.clone().into(),
                };

                Ok(EncodeOutput {
                    job_id,
                    output_location: self.request.output_location,
                    output_path: path,
                    output_size_bytes,
                    duration_ms: started.elapsed().as_millis() as u64,
                })
            }
        }
    }

    async fn killed(&self, job_id: &str) -> Result<EncodeOutput, EncodeError> {
        self.killed.write().await.push(job_id.to_string());
        Err(EncodeError::Killed)
    }
}

#[async_trait]
impl Encoder for MockEncoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, location: &str) -> Result<MediaInfo, EncodeError> {
        Ok(MediaInfo {
            location: location.to_string(),
            size_bytes: Some(10 * 1024 * 1024),
            duration_secs: Some(60.0),
            format: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            video_codec: Some("h264".to_string()),
            video_profile: Some("High".to_string()),
            pixel_format: Some("yuv420p".to_string()),
            video_width: Some(1280),
            video_height: Some(720),
            audio_codec: Some("aac".to_string()),
            audio_channels: Some(2),
            audio_sample_rate: Some(48000),
        })
    }

    async fn start(&self, request: EncodeRequest) -> Result<EncodeHandle, EncodeError> {
        self.started.write().await.push(request.clone());

        let outcome = self.take_outcome().await;
        if let MockOutcome::StartError(err) = outcome {
            return Err(err);
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let run = MockRun {
            request,
            outcome,
            steps: self.progress_steps.read().await.clone(),
            duration: Duration::from_millis(*self.encode_duration_ms.read().await),
            write_output: *self.write_output.read().await,
            killed: Arc::clone(&self.killed),
            _active: ActiveGuard(Arc::clone(&self.active)),
        };
        let job_id = run.request.job_id.clone();

        Ok(EncodeHandle::spawn(job_id, move |progress_tx, kill_rx| {
            run.run(progress_tx, kill_rx)
        }))
    }

    async fn validate(&self) -> Result<(), EncodeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str, output: &str) -> EncodeRequest {
        EncodeRequest {
            job_id: id.to_string(),
            input_location: "/in/source.mov".to_string(),
            output_location: output.to_string(),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_success_writes_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("out.mp4");

        let encoder = MockEncoder::new();
        encoder.set_write_output(true).await;
        encoder.set_progress_steps(vec![50]).await;

        let mut handle = encoder
            .start(request("a", output.to_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(handle.next_progress().await.unwrap().percent, 50);

        let result = handle.wait().await.unwrap();
        assert!(result.output_size_bytes > 0);
        assert!(output.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_crash_removes_partial() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("out.mp4");

        let encoder = MockEncoder::new();
        encoder.set_write_output(true).await;
        encoder
            .set_next_outcome(MockOutcome::Crash { signal: Some(9) })
            .await;

        let handle = encoder
            .start(request("a", output.to_str().unwrap()))
            .await
            .unwrap();
        let err = handle.wait().await.unwrap_err();
        assert_eq!(err.class(), FailureClass::TransientEngine);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_hang_ends_on_kill() {
        let encoder = MockEncoder::new();
        encoder.set_next_outcome(MockOutcome::Hang).await;

        let mut handle = encoder.start(request("a", "/out/a.mp4")).await.unwrap();
        handle.kill();
        assert!(matches!(handle.wait().await, Err(EncodeError::Killed)));
        assert_eq!(encoder.killed_jobs().await, vec!["a".to_string()]);
        assert_eq!(encoder.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_start_error_is_returned() {
        let encoder = MockEncoder::new();
        encoder
            .set_next_outcome(MockOutcome::StartError(EncodeError::unsupported_location(
                "ftp://host/a.mov",
            )))
            .await;

        let result = encoder.start(request("a", "/out/a.mp4")).await;
        assert!(matches!(result, Err(EncodeError::UnsupportedLocation { .. })));
        assert_eq!(encoder.started_jobs().await, vec!["a".to_string()]);
    }
}
