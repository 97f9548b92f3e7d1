#![allow(missing_docs)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use futures::stream;
use imagegear::{
    index::RecordStream, list::Page, storage::Removal, Gallery, GalleryError, ImageRecord,
    IncomingFile, IndexError, ListQuery, MemoryIndex, MemoryStore, MetadataIndex, ObjectStore,
    RejectReason, StorageError,
};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF\0";
const GIF: &[u8] = b"GIF89a\x01\0\x01\0";

#[tokio::test]
async fn partial_batch_keeps_valid_files() {
    let store = MemoryStore::new();
    let index = MemoryIndex::new();
    let gallery = gallery(store.clone(), Some(index.clone()));

    let report = gallery
        .ingest(vec![
            IncomingFile::new("a.png", PNG),
            IncomingFile::new("notes.txt", &b"just some text"[..]),
            IncomingFile::new("b.jpg", JPEG),
        ])
        .await
        .expect("two files are valid");

    assert_eq!(report.accepted.len(), 2);
    assert_eq!(report.rejected_count, 1);
    assert_eq!(report.rejections.len(), 1);
    assert_eq!(report.rejections[0].file_name, "notes.txt");
    assert_eq!(report.rejections[0].reason, RejectReason::UnsupportedContent);
    assert!(report.accepted.iter().all(|record| record.id.is_some()));

    assert_eq!(store.len().await, 2);
    assert_eq!(index.len().await, 2);
    for record in &report.accepted {
        assert!(store.exists(&record.name).await.expect("exists"));
        assert_eq!(record.access_path(), format!("/uploads/{}", record.name));
    }
}

#[tokio::test]
async fn batch_of_invalid_files_fails_without_writes() {
    let store = MemoryStore::new();
    let index = MemoryIndex::new();
    let gallery = gallery(store.clone(), Some(index.clone()));

    let err = gallery
        .ingest(vec![
            IncomingFile::new("a.png", &b"not a png"[..]),
            IncomingFile::new("b.gif", &b""[..]),
            IncomingFile::new("c.jpg", &b"<html>"[..]),
        ])
        .await
        .expect_err("nothing is valid");

    assert!(matches!(err, GalleryError::NoValidImages { rejected: 3 }));
    assert!(store.is_empty().await);
    assert!(index.is_empty().await);
}

#[tokio::test]
async fn empty_batch_is_a_validation_error() {
    let gallery = gallery(MemoryStore::new(), None);
    let err = gallery.ingest(Vec::new()).await.expect_err("no files");
    assert!(matches!(err, GalleryError::NoFiles));
}

#[tokio::test]
async fn content_decides_over_extension() {
    let store = MemoryStore::new();
    let gallery = gallery(store.clone(), None);

    let report = gallery
        .ingest(vec![IncomingFile::new("diagram.txt", PNG)])
        .await
        .expect("png content is accepted");
    assert_eq!(report.accepted.len(), 1);
    assert!(report.accepted[0].name.ends_with("-diagram.png"));

    let err = gallery
        .ingest(vec![IncomingFile::new("fake.png", &b"plain text"[..])])
        .await
        .expect_err("text content is rejected");
    assert!(matches!(err, GalleryError::NoValidImages { rejected: 1 }));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn disallowed_kind_is_rejected() {
    let gallery = Gallery::builder()
        .storage(MemoryStore::new())
        .allowed_kinds([imagegear::MediaKind::Png])
        .build()
        .expect("valid config");

    let report = gallery
        .ingest(vec![
            IncomingFile::new("a.png", PNG),
            IncomingFile::new("b.gif", GIF),
        ])
        .await
        .expect("png is allowed");
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.rejected_count, 1);
}

#[tokio::test]
async fn index_failure_leaves_an_orphan_file() {
    let store = MemoryStore::new();
    let gallery = Gallery::builder()
        .storage(store.clone())
        .index(FailingIndex)
        .build()
        .expect("valid config");

    let report = gallery
        .ingest(vec![IncomingFile::new("orphan.gif", GIF)])
        .await
        .expect("the file write succeeded");
    assert_eq!(report.accepted.len(), 1);
    assert_eq!(report.accepted[0].id, None);
    assert!(store
        .exists(&report.accepted[0].name)
        .await
        .expect("exists"));

    let scanning = gallery_over(Arc::new(store.clone()), None);
    let images = scanning
        .list(&ListQuery::default())
        .await
        .expect("scan listing");
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].filename, report.accepted[0].name);
}

#[tokio::test]
async fn storage_failure_skips_only_the_failing_file() {
    let store = FlakyStore::new("broken");
    let index = MemoryIndex::new();
    let gallery = Gallery::builder()
        .shared_storage(Arc::new(store.clone()))
        .index(index.clone())
        .build()
        .expect("valid config");

    let report = gallery
        .ingest(vec![
            IncomingFile::new("broken.png", PNG),
            IncomingFile::new("fine.png", PNG),
        ])
        .await
        .expect("one file is stored");

    assert_eq!(report.accepted.len(), 1);
    assert!(report.accepted[0].name.ends_with("-fine.png"));
    assert_eq!(report.rejected_count, 1);
    assert!(matches!(
        &report.rejections[0].reason,
        RejectReason::StorageFailed { .. }
    ));
    assert_eq!(index.len().await, 1);
}

#[tokio::test]
async fn fan_out_respects_the_worker_ceiling() {
    let store = FlakyStore::new("never-matches-anything");
    let gallery = Gallery::builder()
        .shared_storage(Arc::new(store.clone()))
        .workers(2)
        .build()
        .expect("valid config");

    let files = (0..8)
        .map(|n| IncomingFile::new(format!("{n}.png"), PNG))
        .collect();
    let report = gallery.ingest(files).await.expect("all valid");

    assert_eq!(report.accepted.len(), 8);
    assert!(store.peak_in_flight() <= 2, "peak {}", store.peak_in_flight());
    assert!(store.peak_in_flight() >= 1);
}

#[tokio::test]
async fn upload_parses_the_file_field() {
    let store = MemoryStore::new();
    let gallery = gallery(store.clone(), None);

    let mut body = Vec::new();
    body.extend_from_slice(b"--BOUND\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nhello\r\n");
    body.extend_from_slice(
        b"--BOUND\r\nContent-Disposition: form-data; name=\"file\"; filename=\"x.png\"\r\nContent-Type: image/png\r\n\r\n",
    );
    body.extend_from_slice(PNG);
    body.extend_from_slice(
        b"\r\n--BOUND\r\nContent-Disposition: form-data; name=\"file\"; filename=\"y.gif\"\r\n\r\n",
    );
    body.extend_from_slice(GIF);
    body.extend_from_slice(b"\r\n--BOUND--\r\n");

    let chunks: Vec<Result<Bytes, GalleryError>> = body
        .chunks(7)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    let report = gallery
        .upload("multipart/form-data; boundary=BOUND", stream::iter(chunks))
        .await
        .expect("upload succeeds");

    assert_eq!(report.accepted.len(), 2);
    assert_eq!(store.len().await, 2);
}

fn gallery(store: MemoryStore, index: Option<MemoryIndex>) -> Gallery {
    gallery_over(
        Arc::new(store),
        index.map(|index| Arc::new(index) as Arc<dyn MetadataIndex>),
    )
}

fn gallery_over(store: Arc<dyn ObjectStore>, index: Option<Arc<dyn MetadataIndex>>) -> Gallery {
    let mut builder = Gallery::builder().shared_storage(store);
    if let Some(index) = index {
        builder = builder.shared_index(index);
    }
    builder.build().expect("valid config")
}

#[derive(Debug)]
struct FailingIndex;

#[async_trait::async_trait]
impl MetadataIndex for FailingIndex {
    async fn insert(&self, _record: ImageRecord) -> Result<ImageRecord, IndexError> {
        Err(IndexError::Backend("index unavailable".to_owned()))
    }

    async fn find(&self, _page: Page) -> Result<Vec<ImageRecord>, IndexError> {
        Err(IndexError::Backend("index unavailable".to_owned()))
    }

    async fn delete_by_name(&self, _name: &str) -> Result<u64, IndexError> {
        Err(IndexError::Backend("index unavailable".to_owned()))
    }

    async fn all(&self) -> Result<RecordStream, IndexError> {
        Err(IndexError::Backend("index unavailable".to_owned()))
    }
}

/// Memory store that fails puts whose name contains a marker and tracks how
/// many puts run at once.
#[derive(Debug, Clone)]
struct FlakyStore {
    inner: MemoryStore,
    marker: &'static str,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FlakyStore {
    fn new(marker: &'static str) -> Self {
        Self {
            inner: MemoryStore::new(),
            marker,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ObjectStore for FlakyStore {
    async fn put(&self, name: &str, bytes: Bytes) -> Result<u64, StorageError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = if name.contains(self.marker) {
            Err(StorageError::Io {
                name: name.to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        } else {
            self.inner.put(name, bytes).await
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn get(&self, name: &str) -> Result<Option<Bytes>, StorageError> {
        self.inner.get(name).await
    }

    async fn remove(&self, name: &str) -> Result<Removal, StorageError> {
        self.inner.remove(name).await
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        self.inner.exists(name).await
    }

    async fn names(&self) -> Result<Vec<String>, StorageError> {
        self.inner.names().await
    }

    async fn modified(&self, name: &str) -> Result<Option<i64>, StorageError> {
        self.inner.modified(name).await
    }
}
