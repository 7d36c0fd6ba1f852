//! In-progress output files.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Sibling path the engine writes to before the output is moved into place.
///
/// Namespaced by job id and delivery attempt. A worker whose lease expired can
/// still be encoding while the redelivered attempt starts, so each attempt
/// owns its own file.
pub fn partial_path(output: &Path, job_id: &str, attempt: u32) -> PathBuf {
    let file_name = output
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let job_id: String = job_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    output.with_file_name(format!(".{}.{}.{}.partial", file_name, job_id, attempt))
}

/// A partial output file, removed on drop unless persisted.
#[derive(Debug)]
pub struct PartialFile {
    path: PathBuf,
    persisted: bool,
}

impl PartialFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            persisted: false,
        }
    }

    /// Partial file for one attempt at a job's output location.
    pub fn for_output(output: &Path, job_id: &str, attempt: u32) -> Self {
        Self::new(partial_path(output, job_id, attempt))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically moves the file to `dest`.
    pub async fn persist(mut self, dest: &Path) -> io::Result<()> {
        tokio::fs::rename(&self.path, dest).await?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial output"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove partial output"),
        }
    }
}
