//! Optional metadata index over stored images.
//!
//! When no index is configured, listing falls back to scanning the object
//! store and reconciliation has nothing to do.

use futures::stream::BoxStream;

use crate::{list::Page, record::ImageRecord, IndexError};

/// In-process index.
pub mod memory;
/// Embedded persistent index backed by `redb`.
#[cfg(feature = "redb")]
pub mod redb;

pub use memory::MemoryIndex;
#[cfg(feature = "redb")]
pub use self::redb::RedbIndex;

/// Stream of records yielded by [`MetadataIndex::all`].
///
/// Individual items may fail without ending the stream.
pub type RecordStream = BoxStream<'static, Result<ImageRecord, IndexError>>;

/// Async trait abstraction over a metadata index backend.
#[async_trait::async_trait]
pub trait MetadataIndex: Send + Sync + std::fmt::Debug {
    /// Stores a new record and returns it with its assigned id.
    async fn insert(&self, record: ImageRecord) -> Result<ImageRecord, IndexError>;

    /// Returns one page of records, newest `modified_at` first.
    async fn find(&self, page: Page) -> Result<Vec<ImageRecord>, IndexError>;

    /// Deletes every record named `name` and returns how many were removed.
    async fn delete_by_name(&self, name: &str) -> Result<u64, IndexError>;

    /// Streams every record, in no particular order.
    async fn all(&self) -> Result<RecordStream, IndexError>;
}
