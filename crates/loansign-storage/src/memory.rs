//! In-memory storage backend.
//!
//! Everything lives in a `BTreeMap` behind a `RwLock` and is lost when the
//! process exits. Sorted keys make prefix listing a range scan.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{StorageBackend, StorageError};

/// An in-memory storage backend backed by a `BTreeMap`.
///
/// Cloning is cheap and clones share the same map.
///
/// # Examples
///
/// ```
/// # use loansign_storage::{MemoryBackend, StorageBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// backend.put("agreements/a1", b"{}").await.unwrap();
/// assert!(backend.exists("agreements/a1").await.unwrap());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Whether the backend holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.data
            .write()
            .await
            .insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn put_batch(&self, entries: &[(String, Vec<u8>)]) -> Result<(), StorageError> {
        // One guard for the whole batch so readers never see a partial write.
        let mut data = self.data.write().await;
        for (key, value) in entries {
            data.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let data = self.data.read().await;
        Ok(data
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.read().await.contains_key(key))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_reads_as_none() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("agreements/nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_overwrites_previous_value() {
        let backend = MemoryBackend::new();
        backend.put("agreements/a1", b"v1").await.unwrap();
        backend.put("agreements/a1", b"v2").await.unwrap();
        assert_eq!(
            backend.get("agreements/a1").await.unwrap(),
            Some(b"v2".to_vec())
        );
    }

    #[tokio::test]
    async fn batch_writes_every_entry() {
        let backend = MemoryBackend::new();
        let entries = vec![
            ("agreements/a1".to_owned(), b"a".to_vec()),
            ("borrowers/a1/b1".to_owned(), b"b1".to_vec()),
            ("borrowers/a1/b2".to_owned(), b"b2".to_vec()),
        ];
        backend.put_batch(&entries).await.unwrap();
        assert_eq!(backend.len().await, 3);
        assert_eq!(
            backend.get("borrowers/a1/b2").await.unwrap(),
            Some(b"b2".to_vec())
        );
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let backend = MemoryBackend::new();
        backend.put("signatures/a1/b1", b"x").await.unwrap();
        backend.delete("signatures/a1/b1").await.unwrap();
        backend.delete("signatures/a1/b1").await.unwrap();
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn list_stops_at_prefix_boundary() {
        let backend = MemoryBackend::new();
        backend.put("borrowers/a1/x", b"1").await.unwrap();
        backend.put("borrowers/a1/y", b"2").await.unwrap();
        backend.put("borrowers/a2/z", b"3").await.unwrap();
        backend.put("signatures/a1/x", b"4").await.unwrap();

        let keys = backend.list("borrowers/a1/").await.unwrap();
        assert_eq!(keys, vec!["borrowers/a1/x", "borrowers/a1/y"]);
        assert!(backend.list("audit/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let backend = MemoryBackend::new();
        let clone = backend.clone();
        backend.put("agreements/a1", b"v").await.unwrap();
        assert!(clone.exists("agreements/a1").await.unwrap());
    }
}
