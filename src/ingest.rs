//! Concurrent ingestion of one upload request.

use std::{sync::Arc, time::Duration};

use futures::{stream, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    form::IncomingFile,
    index::MetadataIndex,
    naming,
    record::{unix_now, ImageRecord},
    sniff::{Classification, ContentValidator},
    storage::ObjectStore,
    GalleryError, IndexError,
};

/// Why a single file was left out of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "reason", rename_all = "snake_case"))]
pub enum RejectReason {
    /// The content is not one of the accepted image kinds.
    UnsupportedContent,
    /// The object store failed to persist the file.
    StorageFailed {
        /// Error message from the store.
        message: String,
    },
}

/// A file that was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Rejection {
    /// Client supplied file name.
    pub file_name: String,
    /// Reason for the rejection.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub reason: RejectReason,
}

/// Outcome of one ingestion call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct IngestReport {
    /// Stored images. Order is unspecified.
    pub accepted: Vec<ImageRecord>,
    /// Number of files that were not stored.
    pub rejected_count: usize,
    /// Per-file detail for every rejected file.
    pub rejections: Vec<Rejection>,
}

/// Validates, names, stores and indexes the files of one request.
#[derive(Debug, Clone)]
pub struct Ingestor {
    store: Arc<dyn ObjectStore>,
    index: Option<Arc<dyn MetadataIndex>>,
    validator: ContentValidator,
    workers: usize,
    index_timeout: Duration,
}

enum Outcome {
    Accepted(ImageRecord),
    Rejected(Rejection),
}

impl Ingestor {
    /// Creates an ingestor. `workers` is clamped to at least one.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        index: Option<Arc<dyn MetadataIndex>>,
        validator: ContentValidator,
        workers: usize,
        index_timeout: Duration,
    ) -> Self {
        Self {
            store,
            index,
            validator,
            workers: workers.max(1),
            index_timeout,
        }
    }

    /// Ingests every file independently with at most `workers` in flight.
    ///
    /// A file that fails validation or storage is skipped without affecting
    /// its siblings. A failed index write leaves the stored file in place and
    /// still reports it as accepted. Fails when nothing was accepted.
    pub async fn ingest(&self, files: Vec<IncomingFile>) -> Result<IngestReport, GalleryError> {
        if files.is_empty() {
            return Err(GalleryError::NoFiles);
        }
        debug!(files = files.len(), "ingesting upload");

        let report = Mutex::new(IngestReport::default());
        stream::iter(files)
            .for_each_concurrent(self.workers, |file| {
                let report = &report;
                async move {
                    let outcome = self.ingest_one(file).await;
                    let mut report = report.lock().await;
                    match outcome {
                        Outcome::Accepted(record) => report.accepted.push(record),
                        Outcome::Rejected(rejection) => {
                            report.rejected_count += 1;
                            report.rejections.push(rejection);
                        }
                    }
                }
            })
            .await;

        let report = report.into_inner();
        if report.accepted.is_empty() {
            return Err(GalleryError::NoValidImages {
                rejected: report.rejected_count,
            });
        }
        Ok(report)
    }

    async fn ingest_one(&self, file: IncomingFile) -> Outcome {
        let original = file.original_name().to_owned();

        let kind = match self.validator.classify(&file.body) {
            Classification::Accepted(kind) => kind,
            Classification::Rejected => {
                warn!(file = %original, "rejected file with unsupported content");
                return Outcome::Rejected(Rejection {
                    file_name: original,
                    reason: RejectReason::UnsupportedContent,
                });
            }
        };

        let name = naming::allocate_for(&original, kind);
        if let Err(err) = self.store.put(&name, file.body).await {
            error!(file = %name, error = %err, "failed to store file");
            return Outcome::Rejected(Rejection {
                file_name: original,
                reason: RejectReason::StorageFailed {
                    message: err.to_string(),
                },
            });
        }

        let record = ImageRecord::new(name, unix_now());
        let record = match &self.index {
            Some(index) => match self.insert(index.as_ref(), record.clone()).await {
                Ok(indexed) => indexed,
                Err(err) => {
                    error!(file = %record.name, error = %err, "failed to index stored file");
                    record
                }
            },
            None => record,
        };
        info!(file = %record.name, kind = %kind, "saved file");
        Outcome::Accepted(record)
    }

    async fn insert(
        &self,
        index: &dyn MetadataIndex,
        record: ImageRecord,
    ) -> Result<ImageRecord, IndexError> {
        tokio::time::timeout(self.index_timeout, index.insert(record))
            .await
            .map_err(|_| IndexError::Timeout { operation: "insert" })?
    }
}
