//! Content sniffing for uploaded images.
//!
//! Classification looks only at the leading bytes of the payload. The client
//! supplied file name and part `Content-Type` are never consulted.

use std::{fmt, io::SeekFrom, str::FromStr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::ConfigError;

/// Maximum number of leading bytes inspected by the sniffer.
pub const SNIFF_LEN: usize = 512;

/// Image formats the sniffer recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MediaKind {
    /// JPEG / JFIF.
    Jpeg,
    /// PNG.
    Png,
    /// GIF87a and GIF89a.
    Gif,
    /// WebP (lossy and lossless).
    Webp,
}

impl MediaKind {
    /// Every recognized kind, in signature-check order.
    pub const ALL: [MediaKind; 4] = [Self::Jpeg, Self::Png, Self::Gif, Self::Webp];

    /// Returns the MIME type of this kind.
    pub fn mime(self) -> mime::Mime {
        match self {
            Self::Jpeg => mime::IMAGE_JPEG,
            Self::Png => mime::IMAGE_PNG,
            Self::Gif => mime::IMAGE_GIF,
            Self::Webp => "image/webp"
                .parse()
                .unwrap_or(mime::APPLICATION_OCTET_STREAM),
        }
    }

    /// Extension used when the client supplied none or a mismatched one.
    pub fn canonical_extension(self) -> &'static str {
        self.extensions()[0]
    }

    /// Lowercase file extensions, without the dot, that belong to this kind.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Jpeg => &["jpg", "jpeg", "jpe", "jfif"],
            Self::Png => &["png"],
            Self::Gif => &["gif"],
            Self::Webp => &["webp"],
        }
    }

    /// Finds the kind owning `extension` (case-insensitive, no dot).
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.extensions().contains(&extension.as_str()))
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        })
    }
}

impl FromStr for MediaKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let name = normalized.strip_prefix("image/").unwrap_or(&normalized);
        match name {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "gif" => Ok(Self::Gif),
            "webp" => Ok(Self::Webp),
            _ => Err(ConfigError::UnknownMediaKind(value.to_owned())),
        }
    }
}

/// Detects the image kind from a byte prefix. Bytes past [`SNIFF_LEN`] are ignored.
pub fn sniff(bytes: &[u8]) -> Option<MediaKind> {
    let prefix = &bytes[..bytes.len().min(SNIFF_LEN)];

    if prefix.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(MediaKind::Jpeg);
    }
    if prefix.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(MediaKind::Png);
    }
    if prefix.starts_with(b"GIF87a") || prefix.starts_with(b"GIF89a") {
        return Some(MediaKind::Gif);
    }
    if prefix.len() >= 14 && &prefix[..4] == b"RIFF" && &prefix[8..14] == b"WEBPVP" {
        return Some(MediaKind::Webp);
    }
    None
}

/// Outcome of content validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The payload is an allowed image kind.
    Accepted(MediaKind),
    /// Unknown signature, or a kind outside the allow-list.
    Rejected,
}

/// Allow-list based content validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentValidator {
    allowed: Vec<MediaKind>,
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::new(MediaKind::ALL)
    }
}

impl ContentValidator {
    /// Creates a validator accepting only `allowed`.
    pub fn new(allowed: impl IntoIterator<Item = MediaKind>) -> Self {
        let mut kinds = Vec::new();
        for kind in allowed {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Self { allowed: kinds }
    }

    /// Kinds accepted by this validator.
    pub fn allowed(&self) -> &[MediaKind] {
        &self.allowed
    }

    /// Returns `true` when `name` carries an extension of an allowed kind.
    pub fn has_allowed_extension(&self, name: &str) -> bool {
        name.rsplit_once('.')
            .and_then(|(_, ext)| MediaKind::from_extension(ext))
            .is_some_and(|kind| self.allowed.contains(&kind))
    }

    /// Classifies an in-memory payload.
    pub fn classify(&self, bytes: &[u8]) -> Classification {
        match sniff(bytes) {
            Some(kind) if self.allowed.contains(&kind) => Classification::Accepted(kind),
            _ => Classification::Rejected,
        }
    }

    /// Classifies a seekable reader.
    ///
    /// Reads at most [`SNIFF_LEN`] bytes and always restores the reader to the
    /// offset it had on entry, so the caller can re-read from there.
    pub async fn classify_reader<R>(&self, reader: &mut R) -> std::io::Result<Classification>
    where
        R: AsyncRead + AsyncSeek + Unpin,
    {
        let start = reader.stream_position().await?;
        let mut buf = [0u8; SNIFF_LEN];
        let mut filled = 0;
        let read = loop {
            if filled == SNIFF_LEN {
                break Ok(());
            }
            match reader.read(&mut buf[filled..]).await {
                Ok(0) => break Ok(()),
                Ok(n) => filled += n,
                Err(err) => break Err(err),
            }
        };
        reader.seek(SeekFrom::Start(start)).await?;
        read?;
        Ok(self.classify(&buf[..filled]))
    }
}
