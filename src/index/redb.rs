use std::{fmt::Display, path::Path, sync::Arc};

use futures::{stream, StreamExt};
use redb::{Database, ReadableTable, TableDefinition};

use super::{MetadataIndex, RecordStream};
use crate::{
    list::Page,
    record::{access_path, ImageRecord, RecordId},
    IndexError,
};

const RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("images");
const BY_NAME: TableDefinition<&str, u64> = TableDefinition::new("images_by_name");
const BY_TIME: TableDefinition<(i64, u64), ()> = TableDefinition::new("images_by_modified");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_ID: &str = "next_id";

/// Persisted form of a record. The URL is stored for external readers but
/// always recomputed from the name when loaded.
#[derive(serde::Serialize, serde::Deserialize)]
struct StoredImage {
    filename: String,
    url: String,
    modified: i64,
}

/// Index persisted in an embedded `redb` database file.
///
/// Records are keyed by a monotonically increasing id, with secondary tables
/// for name lookup and `(modified, id)` ordering.
#[derive(Clone)]
pub struct RedbIndex {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbIndex").finish_non_exhaustive()
    }
}

impl RedbIndex {
    /// Opens or creates the database at `path`.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let db = Database::create(path).map_err(backend)?;

        let write_txn = db.begin_write().map_err(backend)?;
        {
            write_txn.open_table(RECORDS).map_err(backend)?;
            write_txn.open_table(BY_NAME).map_err(backend)?;
            write_txn.open_table(BY_TIME).map_err(backend)?;
            write_txn.open_table(META).map_err(backend)?;
        }
        write_txn.commit().map_err(backend)?;

        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, IndexError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, IndexError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(backend)?
    }
}

#[async_trait::async_trait]
impl MetadataIndex for RedbIndex {
    async fn insert(&self, mut record: ImageRecord) -> Result<ImageRecord, IndexError> {
        let stored = StoredImage {
            filename: record.name.clone(),
            url: access_path(&record.name),
            modified: record.modified_at,
        };
        let encoded = serde_json::to_vec(&stored).map_err(backend)?;

        let id = self
            .blocking(move |db| {
                let write_txn = db.begin_write().map_err(backend)?;
                let id = {
                    let mut meta = write_txn.open_table(META).map_err(backend)?;
                    let id = meta
                        .get(NEXT_ID)
                        .map_err(backend)?
                        .map(|guard| guard.value())
                        .unwrap_or(0)
                        + 1;
                    meta.insert(NEXT_ID, id).map_err(backend)?;
                    id
                };
                remove_named(&write_txn, &stored.filename)?;
                {
                    let mut records = write_txn.open_table(RECORDS).map_err(backend)?;
                    records.insert(id, encoded.as_slice()).map_err(backend)?;
                    let mut by_name = write_txn.open_table(BY_NAME).map_err(backend)?;
                    by_name.insert(stored.filename.as_str(), id).map_err(backend)?;
                    let mut by_time = write_txn.open_table(BY_TIME).map_err(backend)?;
                    by_time.insert((stored.modified, id), ()).map_err(backend)?;
                }
                write_txn.commit().map_err(backend)?;
                Ok(id)
            })
            .await?;

        record.id = Some(RecordId(id));
        Ok(record)
    }

    async fn find(&self, page: Page) -> Result<Vec<ImageRecord>, IndexError> {
        self.blocking(move |db| {
            let read_txn = db.begin_read().map_err(backend)?;
            let by_time = read_txn.open_table(BY_TIME).map_err(backend)?;
            let records = read_txn.open_table(RECORDS).map_err(backend)?;

            let mut out = Vec::with_capacity(page.limit.min(256));
            for entry in by_time
                .iter()
                .map_err(backend)?
                .rev()
                .skip(page.offset)
                .take(page.limit)
            {
                let (key, _) = entry.map_err(backend)?;
                let (_, id) = key.value();
                let Some(bytes) = records.get(id).map_err(backend)? else {
                    continue;
                };
                out.push(decode(id, bytes.value())?);
            }
            Ok(out)
        })
        .await
    }

    async fn delete_by_name(&self, name: &str) -> Result<u64, IndexError> {
        let name = name.to_owned();
        self.blocking(move |db| {
            let write_txn = db.begin_write().map_err(backend)?;
            let removed = remove_named(&write_txn, &name)?;
            write_txn.commit().map_err(backend)?;
            Ok(removed)
        })
        .await
    }

    async fn all(&self) -> Result<RecordStream, IndexError> {
        let items = self
            .blocking(|db| {
                let read_txn = db.begin_read().map_err(backend)?;
                let records = read_txn.open_table(RECORDS).map_err(backend)?;
                let mut items = Vec::new();
                for entry in records.iter().map_err(backend)? {
                    items.push(
                        entry
                            .map_err(backend)
                            .and_then(|(id, bytes)| decode(id.value(), bytes.value())),
                    );
                }
                Ok(items)
            })
            .await?;
        Ok(stream::iter(items).boxed())
    }
}

fn remove_named(write_txn: &redb::WriteTransaction, name: &str) -> Result<u64, IndexError> {
    let mut by_name = write_txn.open_table(BY_NAME).map_err(backend)?;
    let Some(id) = by_name.remove(name).map_err(backend)?.map(|guard| guard.value()) else {
        return Ok(0);
    };

    let mut records = write_txn.open_table(RECORDS).map_err(backend)?;
    let bytes = records
        .remove(id)
        .map_err(backend)?
        .map(|guard| guard.value().to_vec());

    if let Some(bytes) = bytes {
        let stored: StoredImage =
            serde_json::from_slice(&bytes).map_err(|err| IndexError::Decode(err.to_string()))?;
        let mut by_time = write_txn.open_table(BY_TIME).map_err(backend)?;
        by_time.remove((stored.modified, id)).map_err(backend)?;
        return Ok(1);
    }
    Ok(0)
}

fn decode(id: u64, bytes: &[u8]) -> Result<ImageRecord, IndexError> {
    let stored: StoredImage =
        serde_json::from_slice(bytes).map_err(|err| IndexError::Decode(err.to_string()))?;
    Ok(ImageRecord {
        id: Some(RecordId(id)),
        name: stored.filename,
        modified_at: stored.modified,
    })
}

fn backend(err: impl Display) -> IndexError {
    IndexError::Backend(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use futures::TryStreamExt;
    use uuid::Uuid;

    use super::*;

    fn temp_db() -> PathBuf {
        std::env::temp_dir().join(format!("imagegear-redb-{}.redb", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn pages_newest_first_and_deletes_by_name() {
        let path = temp_db();
        let index = RedbIndex::open(&path).expect("open index");

        for (name, modified) in [("a.png", 10), ("b.png", 30), ("c.png", 20)] {
            index
                .insert(ImageRecord::new(name, modified))
                .await
                .expect("insert");
        }

        let page = index
            .find(Page { limit: 2, offset: 0 })
            .await
            .expect("find");
        let names: Vec<_> = page.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["b.png", "c.png"]);
        assert!(page.iter().all(|r| r.id.is_some()));

        assert_eq!(index.delete_by_name("b.png").await.expect("delete"), 1);
        assert_eq!(index.delete_by_name("b.png").await.expect("delete again"), 0);

        let all: Vec<ImageRecord> = index
            .all()
            .await
            .expect("all")
            .try_collect()
            .await
            .expect("records decode");
        assert_eq!(all.len(), 2);

        let page = index
            .find(Page { limit: 10, offset: 1 })
            .await
            .expect("find after delete");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "a.png");

        drop(index);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn reopened_database_keeps_records_and_ids() {
        let path = temp_db();
        {
            let index = RedbIndex::open(&path).expect("open index");
            let first = index
                .insert(ImageRecord::new("kept.gif", 5))
                .await
                .expect("insert");
            assert_eq!(first.id, Some(RecordId(1)));
        }

        let index = RedbIndex::open(&path).expect("reopen index");
        let second = index
            .insert(ImageRecord::new("later.gif", 6))
            .await
            .expect("insert");
        assert_eq!(second.id, Some(RecordId(2)));
        assert_eq!(
            index
                .find(Page::default())
                .await
                .expect("find")
                .len(),
            2
        );

        drop(index);
        let _ = std::fs::remove_file(path);
    }
}
