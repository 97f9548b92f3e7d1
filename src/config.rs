use std::time::Duration;

use crate::{ConfigError, Limits, MediaKind};

/// Default ceiling on concurrent per-file work inside one request.
pub const DEFAULT_WORKERS: usize = 16;
/// Default pause between reconciliation passes.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);
/// Default deadline for a single metadata index call.
pub const DEFAULT_INDEX_TIMEOUT: Duration = Duration::from_secs(10);
/// Default multipart field carrying uploaded files.
pub const DEFAULT_FILE_FIELD: &str = "file";

/// Gallery configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryConfig {
    /// Request parsing ceilings.
    pub limits: Limits,
    /// Ceiling on concurrent per-file work for uploads and directory scans.
    pub workers: usize,
    /// Pause between reconciliation passes.
    pub reconcile_interval: Duration,
    /// Deadline for each metadata index call.
    pub index_timeout: Duration,
    /// Accepted media kinds.
    pub allowed_kinds: Vec<MediaKind>,
    /// Multipart field name holding files. Other fields are ignored.
    pub file_field: String,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            workers: DEFAULT_WORKERS,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            index_timeout: DEFAULT_INDEX_TIMEOUT,
            allowed_kinds: MediaKind::ALL.to_vec(),
            file_field: DEFAULT_FILE_FIELD.to_owned(),
        }
    }
}

impl GalleryConfig {
    /// Validates internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.reconcile_interval.is_zero() {
            return Err(ConfigError::ZeroDuration {
                setting: "reconcile_interval",
            });
        }
        if self.index_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                setting: "index_timeout",
            });
        }
        if self.allowed_kinds.is_empty() {
            return Err(ConfigError::NoAcceptedKinds);
        }
        if self.file_field.trim().is_empty() {
            return Err(ConfigError::EmptyFileField);
        }

        let Limits {
            max_file_size,
            max_body_size,
            max_files,
        } = self.limits;
        if max_file_size == Some(0) {
            return Err(ConfigError::InvalidLimit {
                limit: "max_file_size",
                reason: "must be greater than zero",
            });
        }
        if max_body_size == Some(0) {
            return Err(ConfigError::InvalidLimit {
                limit: "max_body_size",
                reason: "must be greater than zero",
            });
        }
        if max_files == Some(0) {
            return Err(ConfigError::InvalidLimit {
                limit: "max_files",
                reason: "must be greater than zero",
            });
        }
        if let (Some(file), Some(body)) = (max_file_size, max_body_size) {
            if file > body {
                return Err(ConfigError::InvalidLimit {
                    limit: "max_file_size",
                    reason: "cannot exceed max_body_size",
                });
            }
        }
        Ok(())
    }

    /// Parses a comma separated list of media kinds, e.g. `"jpeg,png"`.
    pub fn parse_kinds(list: &str) -> Result<Vec<MediaKind>, ConfigError> {
        list.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::parse)
            .collect()
    }
}
