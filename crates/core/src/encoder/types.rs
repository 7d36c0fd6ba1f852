//! Types for the encoder module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::job::Job;

/// A single encode, derived from a leased job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeRequest {
    pub job_id: String,
    pub input_location: String,
    pub output_location: String,
    /// Delivery attempt; keeps overlapping holders of one job apart.
    pub attempt: u32,
}

impl From<&Job> for EncodeRequest {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            input_location: job.input_location.clone(),
            output_location: job.output_location.clone(),
            attempt: job.attempt,
        }
    }
}

/// Progress update during encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeProgress {
    pub job_id: String,
    /// Progress percentage (0-100).
    pub percent: u8,
    /// Output time encoded so far in seconds.
    pub out_time_secs: f64,
    /// Encoding speed (e.g., "2.5x").
    pub speed: Option<String>,
}

/// Result of a successful encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeOutput {
    pub job_id: String,
    /// The job's output location as submitted.
    pub output_location: String,
    /// Where the file ended up on disk.
    pub output_path: PathBuf,
    pub output_size_bytes: u64,
    /// Wall-clock encode time in milliseconds.
    pub duration_ms: u64,
}

/// Media information from probing a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub location: String,
    pub size_bytes: Option<u64>,
    /// Unknown for some live or malformed sources.
    pub duration_secs: Option<f64>,
    /// First container name reported by ffprobe (e.g. "mov").
    pub format: String,
    pub video_codec: Option<String>,
    pub video_profile: Option<String>,
    pub pixel_format: Option<String>,
    pub video_width: Option<u32>,
    pub video_height: Option<u32>,
    pub audio_codec: Option<String>,
    pub audio_channels: Option<u8>,
    pub audio_sample_rate: Option<u32>,
}

impl MediaInfo {
    pub fn has_video(&self) -> bool {
        self.video_codec.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }
}
