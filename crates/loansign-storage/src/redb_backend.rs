//! Pure-Rust redb storage backend, the persistent default.
//!
//! redb is synchronous, so every call is moved onto the Tokio blocking pool.
//! All writes, including batches, go through a single helper that applies a
//! list of mutations inside one write transaction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadOnlyTable, TableDefinition};

use crate::{StorageBackend, StorageError};

/// The single table used for all key-value data.
const DATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("data");

/// One mutation applied inside a write transaction.
enum Mutation {
    Put(String, Vec<u8>),
    Delete(String),
}

/// A storage backend backed by redb.
///
/// # Examples
///
/// ```no_run
/// # use loansign_storage::RedbBackend;
/// let backend = RedbBackend::open("/var/lib/loansign/loansign.redb").unwrap();
/// ```
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbBackend {
    /// Open or create a redb database at the given path.
    ///
    /// Parent directories are created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if the file cannot be created or opened,
    /// or [`StorageError::Transaction`] if the data table cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Open {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        }

        let db = Database::create(path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        // An empty write commits the table definition on first open.
        apply(&db, Vec::new())?;
        tracing::debug!(path = %path.display(), "redb storage opened");

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Return the filesystem path of this database.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn blocking<T, F>(&self, operation: &'static str, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StorageError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StorageError::TaskJoin {
                operation,
                reason: e.to_string(),
            })?
    }
}

fn apply(db: &Database, mutations: Vec<Mutation>) -> Result<(), StorageError> {
    let txn = db.begin_write().map_err(|e| StorageError::Transaction {
        reason: e.to_string(),
    })?;
    {
        let mut table = txn
            .open_table(DATA_TABLE)
            .map_err(|e| StorageError::MissingTable {
                name: format!("data: {e}"),
            })?;
        for mutation in mutations {
            match mutation {
                Mutation::Put(key, value) => {
                    table
                        .insert(key.as_str(), value.as_slice())
                        .map_err(|e| StorageError::Write {
                            key: key.clone(),
                            reason: e.to_string(),
                        })?;
                }
                Mutation::Delete(key) => {
                    table.remove(key.as_str()).map_err(|e| StorageError::Delete {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
                }
            }
        }
    }
    // Dropping an uncommitted transaction aborts it, so an error above
    // leaves the database untouched.
    txn.commit().map_err(|e| StorageError::Transaction {
        reason: e.to_string(),
    })
}

fn read_table(db: &Database) -> Result<ReadOnlyTable<&'static str, &'static [u8]>, StorageError> {
    db.begin_read()
        .map_err(|e| StorageError::Transaction {
            reason: e.to_string(),
        })?
        .open_table(DATA_TABLE)
        .map_err(|e| StorageError::MissingTable {
            name: format!("data: {e}"),
        })
}

#[async_trait::async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_owned();
        self.blocking("get", move |db| {
            let table = read_table(db)?;
            let value = table
                .get(key.as_str())
                .map_err(|e| StorageError::Read {
                    key: key.clone(),
                    reason: e.to_string(),
                })?
                .map(|v| v.value().to_vec());
            Ok(value)
        })
        .await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mutation = Mutation::Put(key.to_owned(), value.to_vec());
        self.blocking("put", move |db| apply(db, vec![mutation]))
            .await
    }

    async fn put_batch(&self, entries: &[(String, Vec<u8>)]) -> Result<(), StorageError> {
        let mutations = entries
            .iter()
            .map(|(k, v)| Mutation::Put(k.clone(), v.clone()))
            .collect();
        self.blocking("put_batch", move |db| apply(db, mutations))
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mutation = Mutation::Delete(key.to_owned());
        self.blocking("delete", move |db| apply(db, vec![mutation]))
            .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix = prefix.to_owned();
        self.blocking("list", move |db| {
            let table = read_table(db)?;
            let range = table
                .range(prefix.as_str()..)
                .map_err(|e| StorageError::List {
                    prefix: prefix.clone(),
                    reason: e.to_string(),
                })?;

            let mut keys = Vec::new();
            for item in range {
                let (k, _) = item.map_err(|e| StorageError::List {
                    prefix: prefix.clone(),
                    reason: e.to_string(),
                })?;
                let key = k.value();
                if !key.starts_with(&prefix) {
                    break;
                }
                keys.push(key.to_owned());
            }
            Ok(keys)
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, RedbBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("nested/loansign.redb")).unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn open_creates_parent_directories() {
        let (dir, backend) = open_temp();
        assert!(dir.path().join("nested").is_dir());
        assert!(backend.path().ends_with("loansign.redb"));
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loansign.redb");
        {
            let backend = RedbBackend::open(&path).unwrap();
            backend.put("agreements/a1", b"{}").await.unwrap();
        }
        let backend = RedbBackend::open(&path).unwrap();
        assert_eq!(
            backend.get("agreements/a1").await.unwrap(),
            Some(b"{}".to_vec())
        );
    }

    #[tokio::test]
    async fn batch_and_list() {
        let (_dir, backend) = open_temp();
        let entries = vec![
            ("borrowers/a1/b2".to_owned(), b"2".to_vec()),
            ("borrowers/a1/b1".to_owned(), b"1".to_vec()),
            ("borrowers/a2/b9".to_owned(), b"9".to_vec()),
        ];
        backend.put_batch(&entries).await.unwrap();

        let keys = backend.list("borrowers/a1/").await.unwrap();
        assert_eq!(keys, vec!["borrowers/a1/b1", "borrowers/a1/b2"]);
    }

    #[tokio::test]
    async fn delete_missing_key_is_ok() {
        let (_dir, backend) = open_temp();
        backend.delete("signatures/a1/b1").await.unwrap();
        backend.put("signatures/a1/b1", b"x").await.unwrap();
        backend.delete("signatures/a1/b1").await.unwrap();
        assert!(!backend.exists("signatures/a1/b1").await.unwrap());
    }
}
