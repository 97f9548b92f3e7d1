use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use tokio::sync::RwLock;

use super::{checked_name, ObjectStore, Removal};
use crate::{record::unix_now, StorageError};

#[derive(Debug, Clone)]
struct Entry {
    bytes: Bytes,
    modified: i64,
}

/// In-memory object store for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object with an explicit modification time, replacing any
    /// previous object of the same name.
    pub async fn put_at(
        &self,
        name: &str,
        bytes: Bytes,
        modified: i64,
    ) -> Result<(), StorageError> {
        let name = checked_name(name)?;
        self.objects
            .write()
            .await
            .insert(name.to_owned(), Entry { bytes, modified });
        Ok(())
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Returns `true` when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, name: &str, bytes: Bytes) -> Result<u64, StorageError> {
        let name = checked_name(name)?;
        let size = bytes.len() as u64;
        let mut objects = self.objects.write().await;
        if objects.contains_key(name) {
            return Err(StorageError::AlreadyExists(name.to_owned()));
        }
        objects.insert(
            name.to_owned(),
            Entry {
                bytes,
                modified: unix_now(),
            },
        );
        Ok(size)
    }

    async fn get(&self, name: &str) -> Result<Option<Bytes>, StorageError> {
        let name = checked_name(name)?;
        Ok(self
            .objects
            .read()
            .await
            .get(name)
            .map(|entry| entry.bytes.clone()))
    }

    async fn remove(&self, name: &str) -> Result<Removal, StorageError> {
        let name = checked_name(name)?;
        Ok(match self.objects.write().await.remove(name) {
            Some(_) => Removal::Removed,
            None => Removal::Absent,
        })
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let name = checked_name(name)?;
        Ok(self.objects.read().await.contains_key(name))
    }

    async fn names(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.objects.read().await.keys().cloned().collect())
    }

    async fn modified(&self, name: &str) -> Result<Option<i64>, StorageError> {
        let name = checked_name(name)?;
        Ok(self
            .objects
            .read()
            .await
            .get(name)
            .map(|entry| entry.modified))
    }
}
