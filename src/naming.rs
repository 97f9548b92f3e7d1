//! Storage name allocation.
//!
//! Every allocated name has the shape `{uuid}-{base}{.ext}` where `base` only
//! contains `[A-Za-z0-9_-]` and `ext` only ASCII alphanumerics. The UUID makes
//! names unique even when identical file names are uploaded concurrently.

use uuid::Uuid;

use crate::sniff::MediaKind;

const MAX_BASE_LEN: usize = 64;
const MAX_EXT_LEN: usize = 16;

/// Allocates a collision-free storage name from a client-supplied file name.
pub fn allocate(original: &str) -> String {
    let (base, ext) = split_name(original);
    compose(&sanitize_base(base), &sanitize_extension(ext))
}

/// Like [`allocate`], but forces an extension belonging to `kind`.
///
/// The client extension is kept when it already names `kind`; otherwise the
/// kind's canonical extension replaces it.
pub fn allocate_for(original: &str, kind: MediaKind) -> String {
    let (base, ext) = split_name(original);
    let ext = sanitize_extension(ext);
    let ext = if kind.extensions().contains(&ext.as_str()) {
        ext
    } else {
        kind.canonical_extension().to_owned()
    };
    compose(&sanitize_base(base), &ext)
}

/// Returns the final path component of a caller-supplied name.
///
/// Both `/` and `\` count as separators. Returns `None` when nothing usable
/// remains (empty, `.` or `..`).
pub fn base_name(input: &str) -> Option<&str> {
    let base = input.rsplit(['/', '\\']).next().unwrap_or(input);
    match base {
        "" | "." | ".." => None,
        _ if base.contains('\0') => None,
        _ => Some(base),
    }
}

fn split_name(original: &str) -> (&str, &str) {
    let name = original.rsplit(['/', '\\']).next().unwrap_or(original);
    match name.rsplit_once('.') {
        Some((base, ext)) => (base, ext),
        None => (name, ""),
    }
}

fn sanitize_base(base: &str) -> String {
    base.chars()
        .take(MAX_BASE_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn sanitize_extension(ext: &str) -> String {
    ext.chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_EXT_LEN)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn compose(base: &str, ext: &str) -> String {
    let id = Uuid::new_v4();
    if ext.is_empty() {
        format!("{id}-{base}")
    } else {
        format!("{id}-{base}.{ext}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_uuid(name: &str) -> &str {
        &name[37..]
    }

    #[test]
    fn keeps_safe_names_readable() {
        let name = allocate("holiday_2024-final.PNG");
        assert_eq!(strip_uuid(&name), "holiday_2024-final.png");
    }

    #[test]
    fn replaces_unsafe_characters() {
        let name = allocate("my photo (1).jpg");
        assert_eq!(strip_uuid(&name), "my_photo__1_.jpg");
    }

    #[test]
    fn handles_missing_extension_and_dotfiles() {
        assert_eq!(strip_uuid(&allocate("README")), "README");
        assert_eq!(strip_uuid(&allocate(".hidden")), ".hidden");
        assert_eq!(strip_uuid(&allocate("archive.tar.gz")), "archive_tar.gz");
    }

    #[test]
    fn allocate_for_swaps_mismatched_extension() {
        let name = allocate_for("scan.txt", MediaKind::Png);
        assert_eq!(strip_uuid(&name), "scan.png");

        let name = allocate_for("portrait.JPEG", MediaKind::Jpeg);
        assert_eq!(strip_uuid(&name), "portrait.jpeg");

        let name = allocate_for("noext", MediaKind::Gif);
        assert_eq!(strip_uuid(&name), "noext.gif");
    }

    #[test]
    fn base_name_takes_last_component() {
        assert_eq!(base_name("../../etc/passwd"), Some("passwd"));
        assert_eq!(base_name("..\\..\\boot.ini"), Some("boot.ini"));
        assert_eq!(base_name("plain.png"), Some("plain.png"));
        assert_eq!(base_name("dir/"), None);
        assert_eq!(base_name(".."), None);
        assert_eq!(base_name("a/.."), None);
        assert_eq!(base_name(""), None);
    }

    #[test]
    fn long_bases_are_truncated() {
        let name = allocate(&format!("{}.png", "x".repeat(500)));
        assert_eq!(strip_uuid(&name).len(), MAX_BASE_LEN + ".png".len());
    }
}
