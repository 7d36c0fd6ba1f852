//! Error types for the encoder module.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::failure::{Failure, FailureClass};

/// Errors that can occur while encoding a job.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// FFmpeg binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// FFprobe binary not found.
    #[error("FFprobe not found at path: {path}")]
    FfprobeNotFound { path: PathBuf },

    /// Input does not exist.
    #[error("Input not found: {location}")]
    InputNotFound { location: String },

    /// Input exists but cannot be read or decoded.
    #[error("Input unreadable: {location}: {reason}")]
    InputUnreadable { location: String, reason: String },

    /// Location is neither a local path nor a supported URI.
    #[error("Unsupported location: {location}")]
    UnsupportedLocation { location: String },

    /// Output destination cannot be written.
    #[error("Output not writable: {path}: {reason}")]
    OutputUnwritable { path: PathBuf, reason: String },

    /// Engine exited with a nonzero status.
    #[error("Encoding failed: {reason}")]
    EngineFailed {
        class: FailureClass,
        reason: String,
        diagnostics: Option<String>,
    },

    /// Engine was terminated by a signal.
    #[error("FFmpeg terminated by signal {}", describe_signal(.signal))]
    Crashed {
        signal: Option<i32>,
        diagnostics: Option<String>,
    },

    /// Engine exited cleanly but left no output behind.
    #[error("Output missing after encode: {path}")]
    OutputMissing { path: PathBuf },

    /// Encode exceeded the maximum duration.
    #[error("Encoding timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Encode was killed before it finished.
    #[error("Encoding killed")]
    Killed,

    /// I/O error while driving the engine.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to parse FFprobe output.
    #[error("Failed to parse media info: {reason}")]
    ParseError { reason: String },

    /// The encode task panicked or was joined twice.
    #[error("Encode task failed: {reason}")]
    TaskFailed { reason: String },
}

fn describe_signal(signal: &Option<i32>) -> String {
    signal
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl EncodeError {
    pub fn input_unreadable(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InputUnreadable {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported_location(location: impl Into<String>) -> Self {
        Self::UnsupportedLocation {
            location: location.into(),
        }
    }

    pub fn output_unwritable(path: &Path, reason: impl ToString) -> Self {
        Self::OutputUnwritable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn engine_failed(
        class: FailureClass,
        reason: impl Into<String>,
        diagnostics: Option<String>,
    ) -> Self {
        Self::EngineFailed {
            class,
            reason: reason.into(),
            diagnostics,
        }
    }

    /// Maps the error onto the failure taxonomy.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::InputNotFound { .. }
            | Self::InputUnreadable { .. }
            | Self::UnsupportedLocation { .. } => FailureClass::Input,
            Self::OutputUnwritable { .. } => FailureClass::OutputWrite,
            Self::EngineFailed { class, .. } => *class,
            Self::Crashed { .. } | Self::Timeout { .. } | Self::Killed => {
                FailureClass::TransientEngine
            }
            Self::Io(e) => match e.kind() {
                io::ErrorKind::WouldBlock
                | io::ErrorKind::OutOfMemory
                | io::ErrorKind::Interrupted
                | io::ErrorKind::TimedOut
                | io::ErrorKind::StorageFull
                | io::ErrorKind::ResourceBusy => FailureClass::TransientEngine,
                _ => FailureClass::Internal,
            },
            Self::FfmpegNotFound { .. }
            | Self::FfprobeNotFound { .. }
            | Self::OutputMissing { .. }
            | Self::ParseError { .. }
            | Self::TaskFailed { .. } => FailureClass::Internal,
        }
    }

    /// Tail of the engine's stderr, when the engine got far enough to write any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::EngineFailed { diagnostics, .. } | Self::Crashed { diagnostics, .. } => {
                diagnostics.as_deref()
            }
            _ => None,
        }
    }

    /// Converts into the failure recorded on the job.
    ///
    /// The last diagnostic line is appended to the reason since it usually
    /// names the actual problem.
    pub fn to_failure(&self) -> Failure {
        let reason = match self.diagnostics().and_then(|d| d.lines().last()) {
            Some(line) if !line.trim().is_empty() => format!("{} ({})", self, line.trim()),
            _ => self.to_string(),
        };
        Failure::new(self.class(), reason)
    }
}
