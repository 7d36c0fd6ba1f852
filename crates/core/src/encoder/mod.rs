//! Encoder module for normalizing source videos.
//!
//! This module provides the `Encoder` trait and an FFmpeg implementation that
//! transcodes any readable source into one fixed, web-compatible profile:
//! H.264 Baseline + AAC stereo in a fast-start MP4.
//!
//! # Features
//!
//! - Local paths, `file://` URIs, and `http(s)://` inputs
//! - Progress reporting from ffmpeg's `-progress` stream
//! - Failure classification from the exit status and stderr tail
//! - Output written to a job-namespaced partial file and renamed into place
//!
//! # Example
//!
//! ```ignore
//! use reelpress_core::encoder::{Encoder, EncodeRequest, FfmpegEncoder};
//!
//! let encoder = FfmpegEncoder::with_defaults();
//! encoder.validate().await?;
//!
//! let mut handle = encoder
//!     .start(EncodeRequest {
//!         job_id: "asset-1".to_string(),
//!         input_location: "/uploads/clip.mov".to_string(),
//!         output_location: "/published/clip.mp4".to_string(),
//!         attempt: 1,
//!     })
//!     .await?;
//!
//! while let Some(progress) = handle.next_progress().await {
//!     println!("{}%", progress.percent);
//! }
//! let output = handle.wait().await?;
//! ```

mod config;
mod diagnostics;
mod error;
mod ffmpeg;
mod handle;
mod location;
mod partial;
mod profile;
mod progress;
mod traits;
mod types;

pub use config::EncoderConfig;
pub use diagnostics::{classify_diagnostics, classify_encode_diagnostics, DIAGNOSTIC_LINES};
pub use error::EncodeError;
pub use ffmpeg::FfmpegEncoder;
pub use handle::{EncodeEvent, EncodeHandle, KillSignal};
pub use location::MediaLocation;
pub use partial::{partial_path, PartialFile};
pub use profile::OutputProfile;
pub use traits::Encoder;
pub use types::{EncodeOutput, EncodeProgress, EncodeRequest, MediaInfo};
