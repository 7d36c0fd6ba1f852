//! Configuration for the encoder module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the FFmpeg-based encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Video bitrate ceiling for the output profile, applied to every job.
    #[serde(default = "default_max_video_bitrate")]
    pub max_video_bitrate_kbps: u32,

    /// Additional ffmpeg arguments inserted before the output path.
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Minimum interval between progress reports, in milliseconds.
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_log_level() -> String {
    "error".to_string()
}

fn default_max_video_bitrate() -> u32 {
    2500
}

fn default_progress_interval() -> u64 {
    500
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            log_level: default_log_level(),
            max_video_bitrate_kbps: default_max_video_bitrate(),
            extra_args: Vec::new(),
            progress_interval_ms: default_progress_interval(),
        }
    }
}

impl EncoderConfig {
    /// Sets the ffmpeg binary path.
    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    /// Sets the ffprobe binary path.
    pub fn with_ffprobe_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffprobe_path = path.into();
        self
    }

    /// Sets the video bitrate ceiling.
    pub fn with_max_video_bitrate(mut self, kbps: u32) -> Self {
        self.max_video_bitrate_kbps = kbps;
        self
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EncoderConfig::default();
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.max_video_bitrate_kbps, 2500);
        assert!(config.extra_args.is_empty());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EncoderConfig = toml::from_str(r#"ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg""#).unwrap();
        assert_eq!(config.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.ffprobe_path, PathBuf::from("ffprobe"));
        assert_eq!(config.log_level, "error");
    }
}
