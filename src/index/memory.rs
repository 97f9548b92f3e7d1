use std::sync::Arc;

use futures::{stream, StreamExt};
use tokio::sync::RwLock;

use super::{MetadataIndex, RecordStream};
use crate::{
    list::Page,
    record::{ImageRecord, RecordId},
    IndexError,
};

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    records: Vec<ImageRecord>,
}

/// Index kept in process memory. Contents are lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records in insertion order.
    pub async fn records(&self) -> Vec<ImageRecord> {
        self.inner.read().await.records.clone()
    }

    /// Number of indexed records.
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Returns `true` when the index holds no records.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }
}

#[async_trait::async_trait]
impl MetadataIndex for MemoryIndex {
    /// Names are unique: inserting a known name replaces its record.
    async fn insert(&self, mut record: ImageRecord) -> Result<ImageRecord, IndexError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        record.id = Some(RecordId(inner.next_id));
        inner.records.retain(|existing| existing.name != record.name);
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn find(&self, page: Page) -> Result<Vec<ImageRecord>, IndexError> {
        let mut records = self.inner.read().await.records.clone();
        records.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(records
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn delete_by_name(&self, name: &str) -> Result<u64, IndexError> {
        let mut inner = self.inner.write().await;
        let before = inner.records.len();
        inner.records.retain(|record| record.name != name);
        Ok((before - inner.records.len()) as u64)
    }

    async fn all(&self) -> Result<RecordStream, IndexError> {
        let records = self.inner.read().await.records.clone();
        Ok(stream::iter(records.into_iter().map(Ok)).boxed())
    }
}
