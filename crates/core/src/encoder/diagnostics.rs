//! Engine stderr capture and failure diagnosis.

use std::collections::VecDeque;
use std::path::Path;
use std::process::ExitStatus;

use super::error::EncodeError;
use crate::failure::FailureClass;

/// Stderr lines kept per encode.
pub const DIAGNOSTIC_LINES: usize = 32;

const RESOURCE_PATTERNS: &[&str] = &[
    "cannot allocate memory",
    "no space left on device",
    "resource temporarily unavailable",
    "too many open files",
    "connection refused",
    "connection timed out",
    "server returned 5",
];

const OUTPUT_PATTERNS: &[&str] = &[
    "permission denied",
    "read-only file system",
    "error opening output",
    "could not write header",
    "disk quota exceeded",
];

const MISSING_PATH: &str = "no such file or directory";

const INPUT_PATTERNS: &[&str] = &[
    MISSING_PATH,
    "invalid data found when processing input",
    "moov atom not found",
    "does not contain any stream",
    "could not find codec parameters",
    "error opening input",
    "server returned 404",
    "server returned 403",
];

/// The last few lines an engine wrote to stderr.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: &str) {
        let line = line.trim_end();
        if line.is_empty() || self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn text(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }

    fn into_option(self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(self.text())
        }
    }
}

/// Matches diagnostic text against known failure signatures.
///
/// Resource exhaustion wins over output problems, which win over input
/// problems. Returns `None` when nothing is recognised.
pub fn classify_diagnostics(text: &str) -> Option<FailureClass> {
    let text = text.to_ascii_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| text.contains(p));

    if matches(RESOURCE_PATTERNS) {
        Some(FailureClass::TransientEngine)
    } else if matches(OUTPUT_PATTERNS) {
        Some(FailureClass::OutputWrite)
    } else if matches(INPUT_PATTERNS) {
        Some(FailureClass::Input)
    } else {
        None
    }
}

/// Like [`classify_diagnostics`], but a missing path that names `output` is
/// an output problem rather than a missing input.
pub fn classify_encode_diagnostics(text: &str, output: &Path) -> Option<FailureClass> {
    let output = output.to_string_lossy();
    let missing_output = text.lines().any(|line| {
        line.contains(output.as_ref()) && line.to_ascii_lowercase().contains(MISSING_PATH)
    });

    match classify_diagnostics(text) {
        Some(FailureClass::Input) if missing_output => Some(FailureClass::OutputWrite),
        class => class,
    }
}

/// Builds the error for an engine that exited unsuccessfully while writing
/// to `output`.
pub fn classify_exit(status: ExitStatus, tail: DiagnosticTail, output: &Path) -> EncodeError {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return EncodeError::Crashed {
                signal: Some(signal),
                diagnostics: tail.into_option(),
            };
        }
    }

    let Some(code) = status.code() else {
        return EncodeError::Crashed {
            signal: None,
            diagnostics: tail.into_option(),
        };
    };

    let class =
        classify_encode_diagnostics(&tail.text(), output).unwrap_or(FailureClass::TransientEngine);
    EncodeError::engine_failed(
        class,
        format!("ffmpeg exited with code {}", code),
        tail.into_option(),
    )
}
