//! Collects uploaded files out of a multipart request.

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use tracing::debug;

use crate::{
    parser::{MultipartStream, RawPart},
    GalleryError,
};

/// One uploaded file, fully buffered and bounded by the per-file limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingFile {
    /// Multipart field the file arrived in.
    pub field_name: String,
    /// Client supplied file name. Untrusted.
    pub file_name: Option<String>,
    /// Client supplied content type. Untrusted; never used for validation.
    pub content_type: Option<mime::Mime>,
    /// File bytes.
    pub body: Bytes,
}

impl IncomingFile {
    /// Creates a file with only a name and bytes, as used by direct callers and tests.
    pub fn new(file_name: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            field_name: crate::config::DEFAULT_FILE_FIELD.to_owned(),
            file_name: Some(file_name.into()),
            content_type: None,
            body: body.into(),
        }
    }

    /// File name to derive a storage name from. Falls back to the field name.
    pub fn original_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or(&self.field_name)
    }

    fn from_part(part: RawPart) -> Self {
        Self {
            field_name: part.headers.field_name,
            file_name: part.headers.file_name,
            content_type: part.headers.content_type,
            body: part.body,
        }
    }
}

/// Reads every part and keeps the file parts sent under `file_field`.
///
/// Other fields are parsed (and so still count towards the body limit) but
/// dropped.
pub async fn collect_files<S>(
    mut parts: MultipartStream<S>,
    file_field: &str,
    max_files: Option<usize>,
) -> Result<Vec<IncomingFile>, GalleryError>
where
    S: Stream<Item = Result<Bytes, GalleryError>> + Unpin,
{
    let mut files = Vec::new();
    while let Some(part) = parts.try_next().await? {
        if !part.headers.is_file() || part.headers.field_name != file_field {
            debug!(field = %part.headers.field_name, "ignoring multipart field");
            continue;
        }
        if let Some(max_files) = max_files {
            if files.len() >= max_files {
                return Err(GalleryError::FilesLimitExceeded { max_files });
            }
        }
        files.push(IncomingFile::from_part(part));
    }
    Ok(files)
}
