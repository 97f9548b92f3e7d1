#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core crate surface for `imagegear`: validated image uploads, paginated
//! listings, idempotent deletes and background index reconciliation.

use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Fluent builder API.
pub mod builder;
/// Gallery configuration.
pub mod config;
/// Error types exposed by this crate.
pub mod error;
/// Uploaded file collection.
pub mod form;
/// Metadata index traits and implementations.
pub mod index;
/// Upload ingestion.
pub mod ingest;
/// Request limits.
pub mod limits;
/// Paginated listings.
pub mod list;
/// Storage name allocation.
pub mod naming;
/// Low-level parser components.
pub mod parser;
/// Background index reconciliation.
pub mod reconcile;
/// Image records and listing views.
pub mod record;
/// Content sniffing.
pub mod sniff;
/// Object store traits and implementations.
pub mod storage;

#[cfg(feature = "axum")]
pub mod axum;

pub use builder::GalleryBuilder;
pub use config::GalleryConfig;
pub use error::{ConfigError, ErrorKind, GalleryError, IndexError, ParseError, StorageError};
pub use form::IncomingFile;
pub use index::{MemoryIndex, MetadataIndex};
#[cfg(feature = "redb")]
pub use index::RedbIndex;
pub use ingest::{IngestReport, Ingestor, RejectReason, Rejection};
pub use limits::Limits;
pub use list::{Lister, Page};
pub use reconcile::{ReconcileReport, Reconciler};
pub use record::{ImageRecord, ImageView, RecordId};
pub use sniff::{Classification, ContentValidator, MediaKind};
pub use storage::{DiskStore, MemoryStore, ObjectStore, Removal};

use parser::{MultipartStream, StreamLimits};

/// Raw listing parameters as they arrive from a query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct ListQuery {
    /// Requested page size.
    pub limit: Option<String>,
    /// Requested number of entries to skip.
    pub offset: Option<String>,
}

impl ListQuery {
    /// Normalized page window.
    pub fn page(&self) -> Page {
        Page::parse(self.limit.as_deref(), self.offset.as_deref())
    }
}

/// Outcome of a delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct DeleteOutcome {
    /// Base name that was deleted.
    pub filename: String,
    /// `false` when the file was already gone.
    pub file_removed: bool,
    /// Index records removed, or files removed when no index is configured.
    pub deleted_count: u64,
}

/// A stored image read back for serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    /// Storage name.
    pub name: String,
    /// Sniffed kind; `None` for content that is not a recognized image.
    pub kind: Option<MediaKind>,
    /// File contents.
    pub bytes: Bytes,
}

/// Main `imagegear` entry point.
///
/// Cheap to clone; clones share the same store and index handles.
#[derive(Debug, Clone)]
pub struct Gallery {
    config: GalleryConfig,
    store: Arc<dyn ObjectStore>,
    index: Option<Arc<dyn MetadataIndex>>,
    ingestor: Ingestor,
    lister: Lister,
    reconciler: Reconciler,
}

impl Gallery {
    /// Creates a fluent builder.
    pub fn builder() -> GalleryBuilder {
        GalleryBuilder::default()
    }

    pub(crate) fn from_parts(
        config: GalleryConfig,
        store: Arc<dyn ObjectStore>,
        index: Option<Arc<dyn MetadataIndex>>,
    ) -> Self {
        let validator = ContentValidator::new(config.allowed_kinds.iter().copied());
        let ingestor = Ingestor::new(
            Arc::clone(&store),
            index.clone(),
            validator.clone(),
            config.workers,
            config.index_timeout,
        );
        let lister = match &index {
            Some(index) => Lister::Indexed {
                index: Arc::clone(index),
                timeout: config.index_timeout,
            },
            None => Lister::Scan {
                store: Arc::clone(&store),
                validator,
                workers: config.workers,
            },
        };
        let reconciler = Reconciler::new(
            index.clone(),
            Arc::clone(&store),
            config.reconcile_interval,
            config.index_timeout,
        );
        Self {
            config,
            store,
            index,
            ingestor,
            lister,
            reconciler,
        }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    /// Returns the object store handle.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Returns the metadata index handle, when one is configured.
    pub fn index(&self) -> Option<&Arc<dyn MetadataIndex>> {
        self.index.as_ref()
    }

    /// Rejects a request whose declared length exceeds the body ceiling.
    pub fn check_content_length(&self, len: u64) -> Result<(), GalleryError> {
        match self.config.limits.max_body_size {
            Some(max_body_size) if len > max_body_size => {
                Err(GalleryError::BodySizeLimitExceeded { max_body_size })
            }
            _ => Ok(()),
        }
    }

    /// Parses a `multipart/form-data` body and ingests its files.
    pub async fn upload<S>(&self, content_type: &str, body: S) -> Result<IngestReport, GalleryError>
    where
        S: Stream<Item = Result<Bytes, GalleryError>> + Unpin,
    {
        let boundary = parser::extract_multipart_boundary(content_type)?;
        let limits = self.config.limits;
        let parts = MultipartStream::new(
            &boundary,
            body,
            StreamLimits {
                max_part_size: limits.max_file_size,
                max_body_size: limits.max_body_size,
            },
        )?;
        let files = form::collect_files(parts, &self.config.file_field, limits.max_files).await?;
        self.ingest(files).await
    }

    /// Ingests already collected files.
    pub async fn ingest(&self, files: Vec<IncomingFile>) -> Result<IngestReport, GalleryError> {
        self.ingestor.ingest(files).await
    }

    /// Returns one page of images, newest first.
    pub async fn list(&self, query: &ListQuery) -> Result<Vec<ImageView>, GalleryError> {
        self.lister.list(query.page()).await
    }

    /// Deletes an image by name.
    ///
    /// Only the base component of `filename` is used. Deleting an image that
    /// is already gone succeeds with `file_removed: false`. A failed index
    /// delete is logged and leaves the record for the reconciler.
    pub async fn delete(&self, filename: &str) -> Result<DeleteOutcome, GalleryError> {
        let requested = filename.trim();
        if requested.is_empty() {
            return Err(GalleryError::MissingField { field: "filename" });
        }
        let name = naming::base_name(requested).ok_or_else(|| GalleryError::InvalidName {
            name: requested.to_owned(),
        })?;

        let file_removed = match self.store.remove(name).await? {
            Removal::Removed => true,
            Removal::Absent => {
                debug!(file = %name, "file already absent");
                false
            }
        };

        let deleted_count = match &self.index {
            Some(index) => {
                match tokio::time::timeout(self.config.index_timeout, index.delete_by_name(name))
                    .await
                {
                    Ok(Ok(count)) => count,
                    Ok(Err(err)) => {
                        error!(file = %name, error = %err, "failed to delete index record");
                        0
                    }
                    Err(_) => {
                        error!(file = %name, "index delete timed out");
                        0
                    }
                }
            }
            None => u64::from(file_removed),
        };

        info!(file = %name, file_removed, deleted_count, "deleted file");
        Ok(DeleteOutcome {
            filename: name.to_owned(),
            file_removed,
            deleted_count,
        })
    }

    /// Reads a stored image back. Returns `None` when it does not exist.
    pub async fn open(&self, name: &str) -> Result<Option<ImageFile>, GalleryError> {
        let name = naming::base_name(name).ok_or_else(|| GalleryError::InvalidName {
            name: name.to_owned(),
        })?;
        let Some(bytes) = self.store.get(name).await? else {
            return Ok(None);
        };
        Ok(Some(ImageFile {
            name: name.to_owned(),
            kind: sniff::sniff(&bytes),
            bytes,
        }))
    }

    /// Returns a reconciler bound to this gallery's store and index.
    pub fn reconciler(&self) -> Reconciler {
        self.reconciler.clone()
    }

    /// Spawns the reconciler loop until `token` is cancelled.
    pub fn spawn_reconciler(&self, token: CancellationToken) -> JoinHandle<()> {
        self.reconciler().spawn(token)
    }
}
