use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// URL prefix under which stored images are served.
pub const ACCESS_PREFIX: &str = "/uploads/";

/// Returns the public access path of a stored object.
pub fn access_path(name: &str) -> String {
    format!("{ACCESS_PREFIX}{name}")
}

/// Current time as unix seconds.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

pub(crate) fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(err) => -(err.duration().as_secs() as i64),
    }
}

/// Identifier assigned by a metadata index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata tracked for one stored image.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageRecord {
    /// Index-assigned identifier; `None` until the record has been indexed.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub id: Option<RecordId>,
    /// Unique storage name.
    #[cfg_attr(feature = "serde", serde(rename = "filename"))]
    pub name: String,
    /// Unix seconds at ingestion.
    #[cfg_attr(feature = "serde", serde(rename = "modified"))]
    pub modified_at: i64,
}

impl ImageRecord {
    /// Creates an unindexed record.
    pub fn new(name: impl Into<String>, modified_at: i64) -> Self {
        Self {
            id: None,
            name: name.into(),
            modified_at,
        }
    }

    /// Public access path, derived from the name.
    pub fn access_path(&self) -> String {
        access_path(&self.name)
    }

    /// Converts this record into its listing view.
    pub fn view(&self) -> ImageView {
        ImageView::new(self.name.clone(), self.modified_at)
    }
}

/// Listing entry returned by both listing strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImageView {
    /// Storage name.
    pub filename: String,
    /// Public access path.
    pub url: String,
    /// Unix seconds of the last modification.
    pub modified: i64,
}

impl ImageView {
    /// Builds a view; the URL is derived from `filename`.
    pub fn new(filename: String, modified: i64) -> Self {
        let url = access_path(&filename);
        Self {
            filename,
            url,
            modified,
        }
    }
}
