use thiserror::Error;

/// Broad error class used to pick a response status and logging level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing input. No state was changed.
    Validation,
    /// A request or file exceeded a configured ceiling before any write.
    Capacity,
    /// The object store failed to write, read or remove a file.
    Storage,
    /// The metadata index failed or did not answer in time.
    Index,
}

/// Top-level error type returned by [`crate::Gallery`] operations.
#[derive(Debug, Error)]
pub enum GalleryError {
    /// Malformed multipart input.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The request carried no file parts.
    #[error("no files uploaded")]
    NoFiles,
    /// Every file in the request was rejected.
    #[error("no valid images uploaded ({rejected} rejected)")]
    NoValidImages {
        /// Number of files that were rejected.
        rejected: usize,
    },
    /// A required request parameter was absent or empty.
    #[error("missing `{field}` parameter")]
    MissingField {
        /// Name of the missing parameter.
        field: &'static str,
    },
    /// A caller-supplied file name has no usable base component.
    #[error("invalid file name `{name}`")]
    InvalidName {
        /// The rejected input.
        name: String,
    },
    /// The request body ended in the middle of a multipart part.
    #[error("multipart stream ended unexpectedly")]
    IncompleteStream,
    /// A single file part exceeded the per-file ceiling.
    #[error("file `{field}` exceeds the maximum size of {max_file_size} bytes")]
    FileSizeLimitExceeded {
        /// Multipart field carrying the file.
        field: String,
        /// Configured ceiling in bytes.
        max_file_size: u64,
    },
    /// The request body exceeded the total ceiling.
    #[error("request body exceeds the maximum size of {max_body_size} bytes")]
    BodySizeLimitExceeded {
        /// Configured ceiling in bytes.
        max_body_size: u64,
    },
    /// The request carried more file parts than allowed.
    #[error("request exceeds the maximum of {max_files} files")]
    FilesLimitExceeded {
        /// Configured file count ceiling.
        max_files: usize,
    },
    /// Object store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Metadata index failure.
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl GalleryError {
    /// Returns the broad class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_)
            | Self::NoFiles
            | Self::NoValidImages { .. }
            | Self::MissingField { .. }
            | Self::InvalidName { .. }
            | Self::IncompleteStream => ErrorKind::Validation,
            Self::FileSizeLimitExceeded { .. }
            | Self::BodySizeLimitExceeded { .. }
            | Self::FilesLimitExceeded { .. } => ErrorKind::Capacity,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Index(_) => ErrorKind::Index,
        }
    }
}

/// Multipart parsing error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("multipart parse error: {message}")]
pub struct ParseError {
    message: String,
}

impl ParseError {
    /// Creates a parse error with a human readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Object store failure.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The name has no usable base component.
    #[error("invalid object name `{0}`")]
    InvalidName(String),
    /// An object with this name already exists.
    #[error("object `{0}` already exists")]
    AlreadyExists(String),
    /// Underlying I/O failure.
    #[error("storage I/O error on `{name}`: {source}")]
    Io {
        /// Object name, or the storage root for directory operations.
        name: String,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            name: name.into(),
            source,
        }
    }
}

/// Metadata index failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// The backend rejected or failed the operation.
    #[error("index backend error: {0}")]
    Backend(String),
    /// A stored record could not be decoded.
    #[error("index record decode error: {0}")]
    Decode(String),
    /// The backend did not answer within the configured deadline.
    #[error("index operation `{operation}` timed out")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
    },
}

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No object store was supplied to the builder.
    #[error("an object store must be configured")]
    MissingStorage,
    /// The worker ceiling must be at least one.
    #[error("worker limit must be greater than zero")]
    ZeroWorkers,
    /// A duration setting must be non-zero.
    #[error("`{setting}` must be greater than zero")]
    ZeroDuration {
        /// Name of the offending setting.
        setting: &'static str,
    },
    /// The accepted media allow-list is empty.
    #[error("at least one media kind must be accepted")]
    NoAcceptedKinds,
    /// The upload field name is empty.
    #[error("file field name cannot be empty")]
    EmptyFileField,
    /// A limit setting is inconsistent.
    #[error("invalid limit `{limit}`: {reason}")]
    InvalidLimit {
        /// Name of the offending limit.
        limit: &'static str,
        /// Explanation.
        reason: &'static str,
    },
    /// A media kind string was not recognized.
    #[error("unknown media kind `{0}`")]
    UnknownMediaKind(String),
}
