/// Default per-file ceiling: 5 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 << 20;

/// Default request body ceiling: room for twenty maximum-size files plus form overhead.
pub const DEFAULT_MAX_BODY_SIZE: u64 = 20 * DEFAULT_MAX_FILE_SIZE + 1024;

/// Size and count ceilings enforced while a request is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum accepted size in bytes for one file part.
    pub max_file_size: Option<u64>,
    /// Maximum accepted request body size in bytes.
    pub max_body_size: Option<u64>,
    /// Maximum number of file parts in one request.
    pub max_files: Option<usize>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size: Some(DEFAULT_MAX_FILE_SIZE),
            max_body_size: Some(DEFAULT_MAX_BODY_SIZE),
            max_files: None,
        }
    }
}

impl Limits {
    /// Limits with every ceiling disabled.
    pub fn unlimited() -> Self {
        Self {
            max_file_size: None,
            max_body_size: None,
            max_files: None,
        }
    }
}
