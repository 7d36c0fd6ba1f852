//! FFmpeg-based encoder implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::config::EncoderConfig;
use super::diagnostics::{classify_diagnostics, classify_exit, DiagnosticTail, DIAGNOSTIC_LINES};
use super::error::EncodeError;
use super::handle::{EncodeHandle, KillSignal};
use super::location::MediaLocation;
use super::partial::PartialFile;
use super::profile::OutputProfile;
use super::progress::ProgressParser;
use super::traits::Encoder;
use super::types::{EncodeOutput, EncodeProgress, EncodeRequest, MediaInfo};
use crate::failure::FailureClass;
use crate::metrics;

/// Upper bound on a single ffprobe run, mostly relevant for remote inputs.
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// FFmpeg-based encoder.
pub struct FfmpegEncoder {
    config: EncoderConfig,
    profile: OutputProfile,
}

impl FfmpegEncoder {
    /// Creates a new FFmpeg encoder with the given configuration.
    pub fn new(config: EncoderConfig) -> Self {
        let profile = OutputProfile::web_baseline().with_max_video_bitrate(config.max_video_bitrate_kbps);
        Self { config, profile }
    }

    /// Creates a new FFmpeg encoder with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EncoderConfig::default())
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn profile(&self) -> &OutputProfile {
        &self.profile
    }

    /// Builds the ffmpeg command line for one encode.
    fn build_args(&self, input: &MediaLocation, partial: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-loglevel".into(),
            self.config.log_level.clone().into(),
            "-y".into(),
            "-i".into(),
            input.engine_arg().to_os_string(),
        ];

        args.extend(self.profile.to_ffmpeg_args().into_iter().map(OsString::from));
        args.extend(self.config.extra_args.iter().map(OsString::from));

        // Machine-readable progress on stdout, diagnostics on stderr
        args.extend(["-progress", "pipe:1", "-nostats"].map(OsString::from));
        args.push(partial.as_os_str().to_os_string());

        args
    }

    /// Parses ffprobe JSON output into MediaInfo.
    fn parse_probe_output(location: &str, output: &str) -> Result<MediaInfo, EncodeError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
            duration: Option<String>,
            size: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            codec_name: Option<String>,
            profile: Option<String>,
            pix_fmt: Option<String>,
            width: Option<u32>,
            height: Option<u32>,
            channels: Option<u8>,
            sample_rate: Option<String>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| EncodeError::ParseError {
                reason: format!("Failed to parse ffprobe output: {}", e),
            })?;

        let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");
        let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");

        let format_name = probe
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown");

        Ok(MediaInfo {
            location: location.to_string(),
            size_bytes: probe.format.size.as_ref().and_then(|s| s.parse().ok()),
            duration_secs: probe
                .format
                .duration
                .as_ref()
                .and_then(|d| d.parse::<f64>().ok())
                .filter(|d| d.is_finite() && *d > 0.0),
            format: format_name.to_string(),
            video_codec: video_stream.and_then(|s| s.codec_name.clone()),
            video_profile: video_stream.and_then(|s| s.profile.clone()),
            pixel_format: video_stream.and_then(|s| s.pix_fmt.clone()),
            video_width: video_stream.and_then(|s| s.width),
            video_height: video_stream.and_then(|s| s.height),
            audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
            audio_channels: audio_stream.and_then(|s| s.channels),
            audio_sample_rate: audio_stream
                .and_then(|s| s.sample_rate.as_ref())
                .and_then(|r| r.parse().ok()),
        })
    }

    /// Checks that a local input exists and can be opened for reading.
    async fn check_local_input(path: &Path, location: &str) -> Result<(), EncodeError> {
        match tokio::fs::metadata(path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EncodeError::InputNotFound {
                location: location.to_string(),
            }),
            Err(e) => Err(EncodeError::input_unreadable(location, e.to_string())),
            Ok(meta) if meta.is_dir() => {
                Err(EncodeError::input_unreadable(location, "is a directory"))
            }
            Ok(_) => tokio::fs::File::open(path)
                .await
                .map(|_| ())
                .map_err(|e| EncodeError::input_unreadable(location, e.to_string())),
        }
    }

    async fn prepare_output_dir(output_path: &Path) -> Result<(), EncodeError> {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EncodeError::output_unwritable(parent, e))?;
        }
        Ok(())
    }

    fn spawn_error(&self, e: std::io::Error) -> EncodeError {
        if e.kind() == std::io::ErrorKind::NotFound {
            EncodeError::FfmpegNotFound {
                path: self.config.ffmpeg_path.clone(),
            }
        } else {
            EncodeError::Io(e)
        }
    }
}

/// Everything a running ffmpeg process needs until it exits.
struct EncodeSession {
    job_id: String,
    child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    partial: PartialFile,
    output_path: PathBuf,
    output_location: String,
    duration_secs: Option<f64>,
    progress_interval: Duration,
}

impl EncodeSession {
    async fn run(
        self,
        progress_tx: mpsc::Sender<EncodeProgress>,
        mut kill_rx: KillSignal,
    ) -> Result<EncodeOutput, EncodeError> {
        let EncodeSession {
            job_id,
            mut child,
            stdout,
            stderr,
            partial,
            output_path,
            output_location,
            duration_secs,
            progress_interval,
        } = self;

        let started = Instant::now();
        let diagnostics = tokio::spawn(collect_diagnostics(stderr));

        let mut lines = BufReader::new(stdout).lines();
        let mut parser = ProgressParser::new(duration_secs);
        let mut last_sent: Option<Instant> = None;
        let mut stdout_open = true;

        let status = loop {
            tokio::select! {
                _ = &mut kill_rx => {
                    debug!(job_id = %job_id, "Killing ffmpeg");
                    let _ = child.kill().await;
                    return Err(EncodeError::Killed);
                }
                line = lines.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => {
                        let Some(sample) = parser.feed(&line) else {
                            continue;
                        };
                        let due = last_sent.map_or(true, |t| t.elapsed() >= progress_interval);
                        if due || sample.finished {
                            let progress = EncodeProgress {
                                job_id: job_id.clone(),
                                percent: sample.percent,
                                out_time_secs: sample.out_time_secs,
                                speed: sample.speed,
                            };
                            // Non-blocking send
                            if progress_tx.try_send(progress).is_err() {
                                metrics::PROGRESS_DROPPED.inc();
                            }
                            last_sent = Some(Instant::now());
                        }
                    }
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        debug!(job_id = %job_id, error = %e, "Progress stream closed");
                        stdout_open = false;
                    }
                },
                status = child.wait() => break status?,
            }
        };

        let tail = diagnostics.await.unwrap_or_default();
        if !status.success() {
            return Err(classify_exit(status, tail, partial.path()));
        }

        let size = match tokio::fs::metadata(partial.path()).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            _ => return Err(EncodeError::OutputMissing { path: output_path }),
        };

        partial
            .persist(&output_path)
            .await
            .map_err(|e| EncodeError::output_unwritable(&output_path, e))?;

        Ok(EncodeOutput {
            job_id,
            output_location,
            output_path,
            output_size_bytes: size,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Drains stderr, keeping the tail. Reads raw bytes so the pipe never stalls
/// on non-UTF-8 output.
async fn collect_diagnostics(stderr: ChildStderr) -> DiagnosticTail {
    let mut reader = BufReader::new(stderr);
    let mut tail = DiagnosticTail::new(DIAGNOSTIC_LINES);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => tail.push(&String::from_utf8_lossy(&buf)),
        }
    }

    tail
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, location: &str) -> Result<MediaInfo, EncodeError> {
        let input = MediaLocation::parse(location)?;
        if let MediaLocation::Local(path) = &input {
            Self::check_local_input(path, location).await?;
        }

        let probe = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(input.engine_arg())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
            Ok(result) => result.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EncodeError::FfprobeNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    EncodeError::Io(e)
                }
            })?,
            Err(_) => {
                return Err(EncodeError::engine_failed(
                    FailureClass::TransientEngine,
                    format!("ffprobe timed out after {} seconds", PROBE_TIMEOUT.as_secs()),
                    None,
                ));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = stderr
                .lines()
                .last()
                .map(str::to_string)
                .unwrap_or_else(|| format!("ffprobe exited with {}", output.status));

            return Err(match classify_diagnostics(&stderr) {
                Some(FailureClass::TransientEngine) => EncodeError::engine_failed(
                    FailureClass::TransientEngine,
                    format!("ffprobe failed: {}", reason),
                    Some(stderr),
                ),
                _ => EncodeError::input_unreadable(location, reason),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(location, &stdout)
    }

    async fn start(&self, request: EncodeRequest) -> Result<EncodeHandle, EncodeError> {
        let input = MediaLocation::parse(&request.input_location)?;
        let output_path = MediaLocation::parse_output(&request.output_location)?;

        let info = self.probe(&request.input_location).await?;
        Self::prepare_output_dir(&output_path).await?;

        let partial = PartialFile::for_output(&output_path, &request.job_id, request.attempt);
        // Leftover from an earlier run of this same attempt
        let _ = tokio::fs::remove_file(partial.path()).await;

        let args = self.build_args(&input, partial.path());
        debug!(job_id = %request.job_id, args = ?args, "Spawning ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(EncodeError::TaskFailed {
                reason: "ffmpeg pipes were not captured".to_string(),
            });
        };

        info!(
            job_id = %request.job_id,
            input = %input,
            output = %output_path.display(),
            duration_secs = ?info.duration_secs,
            "Encoding started"
        );

        let session = EncodeSession {
            job_id: request.job_id.clone(),
            child,
            stdout,
            stderr,
            partial,
            output_path,
            output_location: request.output_location,
            duration_secs: info.duration_secs,
            progress_interval: self.config.progress_interval(),
        };

        Ok(EncodeHandle::spawn(request.job_id, move |progress_tx, kill_rx| {
            session.run(progress_tx, kill_rx)
        }))
    }

    async fn validate(&self) -> Result<(), EncodeError> {
        // Check ffmpeg exists
        let ffmpeg_result = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffmpeg_result {
            return Err(self.spawn_error(e));
        }

        // Check ffprobe exists
        let ffprobe_result = Command::new(&self.config.ffprobe_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffprobe_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(EncodeError::FfprobeNotFound {
                    path: self.config.ffprobe_path.clone(),
                });
            }
            return Err(EncodeError::Io(e));
        }

        Ok(())
    }
}
