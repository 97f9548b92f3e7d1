//! Paginated, newest-first listings.
//!
//! The strategy is chosen once when the [`Lister`] is built: query the
//! metadata index when one is configured, otherwise scan the object store.

use std::{sync::Arc, time::Duration};

use futures::{stream, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    index::MetadataIndex,
    record::ImageView,
    sniff::ContentValidator,
    storage::ObjectStore,
    GalleryError, IndexError,
};

/// Page size used when the caller gives none or a non-positive one.
pub const DEFAULT_LIMIT: usize = 50;

/// Normalized pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Maximum number of entries to return.
    pub limit: usize,
    /// Number of entries to skip.
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Page {
    /// Normalizes raw values: `limit <= 0` becomes [`DEFAULT_LIMIT`] and
    /// `offset < 0` becomes zero.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        let limit = match limit {
            Some(limit) if limit > 0 => usize::try_from(limit).unwrap_or(usize::MAX),
            _ => DEFAULT_LIMIT,
        };
        let offset = match offset {
            Some(offset) if offset > 0 => usize::try_from(offset).unwrap_or(usize::MAX),
            _ => 0,
        };
        Self { limit, offset }
    }

    /// Parses query string values. Unparsable values fall back to defaults.
    pub fn parse(limit: Option<&str>, offset: Option<&str>) -> Self {
        let parse = |value: Option<&str>| value.and_then(|raw| raw.trim().parse::<i64>().ok());
        Self::new(parse(limit), parse(offset))
    }

    /// Applies this window to an already sorted slice, clamping both ends.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self.offset.min(items.len());
        let end = start.saturating_add(self.limit).min(items.len());
        &items[start..end]
    }
}

/// Listing strategy bound at construction.
#[derive(Debug, Clone)]
pub enum Lister {
    /// Query the metadata index.
    Indexed {
        /// Index to query.
        index: Arc<dyn MetadataIndex>,
        /// Deadline for each index call.
        timeout: Duration,
    },
    /// Enumerate and stat the object store.
    Scan {
        /// Store to enumerate.
        store: Arc<dyn ObjectStore>,
        /// Decides which entries count as images, by extension.
        validator: ContentValidator,
        /// Maximum number of concurrent stat calls.
        workers: usize,
    },
}

impl Lister {
    /// Returns one page of images, newest first.
    pub async fn list(&self, page: Page) -> Result<Vec<ImageView>, GalleryError> {
        match self {
            Self::Indexed { index, timeout } => {
                let records = tokio::time::timeout(*timeout, index.find(page))
                    .await
                    .map_err(|_| IndexError::Timeout { operation: "find" })??;
                Ok(records.iter().map(|record| record.view()).collect())
            }
            Self::Scan {
                store,
                validator,
                workers,
            } => scan(store.as_ref(), validator, *workers, page).await,
        }
    }
}

async fn scan(
    store: &dyn ObjectStore,
    validator: &ContentValidator,
    workers: usize,
    page: Page,
) -> Result<Vec<ImageView>, GalleryError> {
    let names = store.names().await?;
    let found = Mutex::new(Vec::with_capacity(names.len()));

    stream::iter(
        names
            .into_iter()
            .filter(|name| validator.has_allowed_extension(name)),
    )
    .for_each_concurrent(workers, |name| {
        let found = &found;
        async move {
            match store.modified(&name).await {
                Ok(Some(modified)) => found.lock().await.push(ImageView::new(name, modified)),
                Ok(None) => debug!(file = %name, "entry vanished during scan"),
                Err(err) => warn!(file = %name, error = %err, "failed to stat entry"),
            }
        }
    })
    .await;

    let mut images = found.into_inner();
    images.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| a.filename.cmp(&b.filename))
    });
    Ok(page.slice(&images).to_vec())
}
