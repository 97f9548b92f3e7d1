use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};
use tracing::warn;
use uuid::Uuid;

use super::{checked_name, ObjectStore, Removal};
use crate::{record::unix_seconds, StorageError};

const TEMP_PREFIX: &str = ".incoming-";

/// Object store rooted at a single directory.
///
/// Objects are written to a hidden temporary file first and hard-linked into
/// place once fully flushed, so a partially written upload never shows up under
/// its final name and an existing object is never replaced.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Opens a store rooted at `root`, creating the directory when missing.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|err| StorageError::io(root.display().to_string(), err))?;
        let metadata = fs::metadata(&root)
            .await
            .map_err(|err| StorageError::io(root.display().to_string(), err))?;
        if !metadata.is_dir() {
            return Err(StorageError::io(
                root.display().to_string(),
                std::io::Error::new(ErrorKind::Other, "storage root is not a directory"),
            ));
        }
        Ok(Self { root })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `name` to a path directly under the root.
    pub fn path_of(&self, name: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(checked_name(name)?))
    }
}

#[async_trait::async_trait]
impl ObjectStore for DiskStore {
    async fn put(&self, name: &str, bytes: Bytes) -> Result<u64, StorageError> {
        let target = self.path_of(name)?;
        if fs::try_exists(&target)
            .await
            .map_err(|err| StorageError::io(name, err))?
        {
            return Err(StorageError::AlreadyExists(name.to_owned()));
        }

        let temp = self.root.join(format!("{TEMP_PREFIX}{}", Uuid::new_v4()));
        if let Err(err) = write_new(&temp, &bytes).await {
            let _ = fs::remove_file(&temp).await;
            return Err(StorageError::io(name, err));
        }

        // Linking fails when the target exists, so a racing writer can never
        // be overwritten.
        let linked = fs::hard_link(&temp, &target).await;
        if let Err(err) = fs::remove_file(&temp).await {
            warn!(file = %temp.display(), error = %err, "failed to remove temp file");
        }
        match linked {
            Ok(()) => Ok(bytes.len() as u64),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(name.to_owned()))
            }
            Err(err) => Err(StorageError::io(name, err)),
        }
    }

    async fn get(&self, name: &str) -> Result<Option<Bytes>, StorageError> {
        let path = self.path_of(name)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::io(name, err)),
        }
    }

    async fn remove(&self, name: &str) -> Result<Removal, StorageError> {
        let path = self.path_of(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(Removal::Removed),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Removal::Absent),
            Err(err) => Err(StorageError::io(name, err)),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let path = self.path_of(name)?;
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::io(name, err)),
        }
    }

    async fn names(&self) -> Result<Vec<String>, StorageError> {
        let root = self.root.display().to_string();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|err| StorageError::io(root.clone(), err))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| StorageError::io(root.clone(), err))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            match entry.file_type().await {
                Ok(kind) if kind.is_file() => names.push(name),
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(StorageError::io(name, err)),
            }
        }
        Ok(names)
    }

    async fn modified(&self, name: &str) -> Result<Option<i64>, StorageError> {
        let path = self.path_of(name)?;
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::io(name, err)),
        };
        let modified = metadata
            .modified()
            .map_err(|err| StorageError::io(name, err))?;
        Ok(Some(unix_seconds(modified)))
    }
}

async fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}
