//! On-disk store for agreement PDFs.
//!
//! One file per agreement at `{root}/agreements/{agreement_id}.pdf`.
//! Writes go to a temporary sibling first and are renamed over the target
//! after `fsync`, so readers only ever see a complete document.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::DocumentError;

/// Filesystem-backed document store.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    /// Create a store rooted at `root`. Directories are created lazily.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Path of the document for `agreement_id`.
    #[must_use]
    pub fn path_for(&self, agreement_id: Uuid) -> PathBuf {
        self.root
            .join("agreements")
            .join(format!("{agreement_id}.pdf"))
    }

    /// Read the current document bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::NotFound`] if nothing was stored yet, or
    /// [`DocumentError::Io`] on any other filesystem failure.
    pub async fn read(&self, agreement_id: Uuid) -> Result<Vec<u8>, DocumentError> {
        let path = self.path_for(agreement_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DocumentError::NotFound { agreement_id })
            }
            Err(e) => Err(io_error(&path, &e)),
        }
    }

    /// Atomically replace the document for `agreement_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Io`] if the directory, temporary file, or
    /// rename fails. The previous document is untouched on failure.
    pub async fn write(&self, agreement_id: Uuid, bytes: &[u8]) -> Result<(), DocumentError> {
        let path = self.path_for(agreement_id);
        let dir = path
            .parent()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, &e))?;

        let tmp = dir.join(format!(".{agreement_id}.{}.tmp", Uuid::new_v4().simple()));
        if let Err(err) = write_synced(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err);
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(&path, &e));
        }

        tracing::debug!(%agreement_id, bytes = bytes.len(), "document written");
        Ok(())
    }

    /// Delete the document for `agreement_id`. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Io`] if the file exists but cannot be removed.
    pub async fn remove(&self, agreement_id: Uuid) -> Result<(), DocumentError> {
        let path = self.path_for(agreement_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, &e)),
        }
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), DocumentError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| io_error(path, &e))?;
    file.write_all(bytes).await.map_err(|e| io_error(path, &e))?;
    file.sync_all().await.map_err(|e| io_error(path, &e))?;
    Ok(())
}

fn io_error(path: &Path, err: &std::io::Error) -> DocumentError {
    DocumentError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let id = Uuid::new_v4();
        let err = store.read(id).await.unwrap_err();
        assert!(matches!(err, DocumentError::NotFound { agreement_id } if agreement_id == id));
    }

    #[tokio::test]
    async fn write_then_replace() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let id = Uuid::new_v4();

        store.write(id, b"%PDF-1.4 first").await.unwrap();
        store.write(id, b"%PDF-1.4 second").await.unwrap();

        assert_eq!(store.read(id).await.unwrap(), b"%PDF-1.4 second");
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let id = Uuid::new_v4();

        store.remove(id).await.unwrap();
        store.write(id, b"%PDF-1.4").await.unwrap();
        store.remove(id).await.unwrap();
        assert!(matches!(
            store.read(id).await.unwrap_err(),
            DocumentError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn no_temporary_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let id = Uuid::new_v4();
        store.write(id, b"%PDF-1.4").await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("agreements"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec![format!("{id}.pdf")]);
    }
}
