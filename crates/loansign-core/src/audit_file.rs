//! File-based audit backend.
//!
//! Appends one JSON object per line. The file is opened lazily in append
//! mode and never rewritten.

use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::audit::{AuditBackend, AuditEntry};
use crate::error::AuditError;

const BACKEND_NAME: &str = "file";

/// Audit backend that writes JSON lines to a file.
pub struct FileAuditBackend {
    path: PathBuf,
    writer: Mutex<Option<tokio::fs::File>>,
}

impl FileAuditBackend {
    /// Create a backend writing to `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(None),
        }
    }

    fn failure(reason: String) -> AuditError {
        AuditError::BackendFailure {
            name: BACKEND_NAME.to_owned(),
            reason,
        }
    }
}

#[async_trait::async_trait]
impl AuditBackend for FileAuditBackend {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    async fn log(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(entry).map_err(|e| AuditError::Serialization {
            reason: e.to_string(),
        })?;
        line.push(b'\n');

        let mut guard = self.writer.lock().await;
        if guard.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Self::failure(format!("failed to create '{}': {e}", parent.display()))
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(|e| {
                    Self::failure(format!(
                        "failed to open audit file '{}': {e}",
                        self.path.display()
                    ))
                })?;
            *guard = Some(file);
        }

        let Some(file) = guard.as_mut() else {
            return Err(Self::failure("file handle missing after open".to_owned()));
        };
        file.write_all(&line)
            .await
            .map_err(|e| Self::failure(format!("write failed: {e}")))?;
        file.flush()
            .await
            .map_err(|e| Self::failure(format!("flush failed: {e}")))?;
        Ok(())
    }
}

impl std::fmt::Debug for FileAuditBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAuditBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
