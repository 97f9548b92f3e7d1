//! Object store abstractions and built-in implementations.

use bytes::Bytes;

use crate::StorageError;

/// Disk-backed object store.
pub mod disk;
/// In-memory object store.
pub mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

/// Result of removing an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The object existed and was removed.
    Removed,
    /// The object was already gone.
    Absent,
}

/// Async trait abstraction over the place image bytes live.
///
/// Names passed in are plain base names; implementations must refuse anything
/// that would resolve outside their root.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// Persists `bytes` under `name` and returns the stored size.
    ///
    /// Fails with [`StorageError::AlreadyExists`] instead of overwriting.
    async fn put(&self, name: &str, bytes: Bytes) -> Result<u64, StorageError>;

    /// Reads an object back. Returns `None` when it does not exist.
    async fn get(&self, name: &str) -> Result<Option<Bytes>, StorageError>;

    /// Removes an object. A missing object is reported, not treated as an error.
    async fn remove(&self, name: &str) -> Result<Removal, StorageError>;

    /// Returns whether an object exists.
    async fn exists(&self, name: &str) -> Result<bool, StorageError>;

    /// Lists the names of all stored objects, in no particular order.
    async fn names(&self) -> Result<Vec<String>, StorageError>;

    /// Returns the modification time (unix seconds), or `None` when missing.
    async fn modified(&self, name: &str) -> Result<Option<i64>, StorageError>;
}

pub(crate) fn checked_name(name: &str) -> Result<&str, StorageError> {
    match crate::naming::base_name(name) {
        Some(base) if base == name => Ok(base),
        _ => Err(StorageError::InvalidName(name.to_owned())),
    }
}
