//! Storage backend abstraction for `LoanSign`.
//!
//! This crate defines the [`StorageBackend`] trait, a plain key-value
//! interface that knows nothing about agreements, borrowers, or signatures.
//! The registry in `loansign-core` serializes workflow records to JSON and
//! stores them through this trait.
//!
//! Two implementations are provided:
//!
//! - [`RedbBackend`]: persistent default, backed by redb (feature `redb-backend`)
//! - [`MemoryBackend`]: in-memory, for tests and throwaway demo instances

mod error;
mod memory;
#[cfg(feature = "redb-backend")]
mod redb_backend;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;

/// A pluggable key-value storage backend.
///
/// Keys are UTF-8 strings using `/` as a separator (e.g. `agreements/<id>`,
/// `signatures/<agreement>/<borrower>`). Values are opaque byte arrays.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a key-value pair, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Store several key-value pairs atomically.
    ///
    /// Readers observe either none or all of the entries.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] or [`StorageError::Transaction`] if
    /// the batch could not be committed. Nothing is written in that case.
    async fn put_batch(&self, entries: &[(String, Vec<u8>)]) -> Result<(), StorageError>;

    /// Delete a key. Deleting a non-existent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the underlying backend fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List all keys that start with the given prefix, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the underlying backend fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Check whether a key exists in storage.
    ///
    /// The default implementation calls [`get`](StorageBackend::get) and checks
    /// for `Some`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }
}
