//! Filename derivation, normalization, and collision handling.
//!
//! Order applied by the coordinator:
//! 1. name from the final response URL, overridden by `Content-Disposition`
//! 2. extension from the name, or guessed from the sniffed content type
//! 3. optional date prefix
//! 4. length cap, then `.jfif` → `.jpg`

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use url::Url;

/// Filenames at or above this many bytes are truncated.
pub const MAX_FILENAME_LEN: usize = 260;

/// Length a long filename's stem is cut to before re-appending the extension.
pub const TRUNCATED_STEM_LEN: usize = 250;

/// Parses Content-Disposition header to extract filename.
///
/// Handles both:
/// - `attachment; filename="example.pdf"`
/// - `attachment; filename=example.pdf`
/// - `attachment; filename*=UTF-8''example.pdf` (RFC 5987)
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    // Try filename*= first (RFC 5987 encoded)
    if let Some(pos) = header.find("filename*=") {
        let start = pos + 10;
        let value = header[start..].trim();
        // Format: charset'language'encoded_value
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            let encoded_name = &encoded[..end].trim();
            if let Ok(decoded) = urlencoding::decode(encoded_name) {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(pos) = header.find("filename=") {
        let start = pos + 9;
        let value = header[start..].trim();

        let raw = if let Some(stripped) = value.strip_prefix('"') {
            stripped.find('"').map(|end| &stripped[..end])
        } else {
            let end = value.find(';').unwrap_or(value.len());
            Some(value[..end].trim())
        };

        if let Some(raw) = raw.filter(|s| !s.is_empty()) {
            let decoded = urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |d| d.into_owned());
            return Some(decoded);
        }
    }

    None
}

/// Sanitizes a filename or folder name for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let sanitized = sanitized.trim().to_string();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Filename from the URL's last path segment, percent-decoded.
///
/// Falls back to `download_<timestamp>` when the path has no usable segment.
pub(crate) fn filename_from_url(url: &Url) -> String {
    if let Some(mut segments) = url.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
        return sanitize_filename(&decoded);
    }

    format!("download_{}", Utc::now().timestamp())
}

/// Lower-cased extension including the leading dot, or empty.
#[must_use]
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Guesses an extension (with dot) for a MIME type.
///
/// Common media types use a fixed preferred extension; anything else takes
/// the first extension `mime_guess` knows for the type.
pub(crate) fn extension_for_content_type(content_type: &str) -> Option<String> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    let preferred = match mime.as_str() {
        "image/jpeg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "image/webp" => Some(".webp"),
        "image/bmp" => Some(".bmp"),
        "video/mp4" => Some(".mp4"),
        "video/webm" => Some(".webm"),
        "audio/mpeg" => Some(".mp3"),
        "audio/wave" | "audio/wav" => Some(".wav"),
        "text/plain" => Some(".txt"),
        "text/html" => Some(".html"),
        "application/pdf" => Some(".pdf"),
        "application/zip" => Some(".zip"),
        _ => None,
    };
    if let Some(ext) = preferred {
        return Some(ext.to_string());
    }

    mime_guess::get_mime_extensions_str(&mime)
        .and_then(|exts| exts.first())
        .map(|ext| format!(".{ext}"))
}

/// Prefixes the filename with the timestamp rendered in `format`.
#[must_use]
pub fn apply_date_prefix(filename: &str, format: &str, time: DateTime<Utc>) -> String {
    format!("{}{filename}", time.format(format))
}

/// Caps overly long names: at or above [`MAX_FILENAME_LEN`] bytes the name is
/// cut to [`TRUNCATED_STEM_LEN`] bytes and the extension re-appended.
#[must_use]
pub fn truncate_long_filename(filename: &str, extension: &str) -> String {
    if filename.len() < MAX_FILENAME_LEN {
        return filename.to_string();
    }
    let mut cut = TRUNCATED_STEM_LEN;
    while !filename.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{extension}", &filename[..cut])
}

/// Rewrites `.jfif` to `.jpg` in both the extension and the filename.
#[must_use]
pub fn normalize_jfif(filename: &str, extension: &str) -> (String, String) {
    if extension == ".jfif" {
        (filename.replace(".jfif", ".jpg"), ".jpg".to_string())
    } else {
        (filename.to_string(), extension.to_string())
    }
}

/// `dir/name-N.ext`, with the suffix placed before the extension.
pub(crate) fn numbered_path(dir: &Path, filename: &str, n: u64) -> PathBuf {
    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename, ""),
    };
    dir.join(format!("{stem}-{n}{ext}"))
}

/// First free path of the form `name-N.ext` (N from 1) in `dir`.
pub(crate) fn next_free_numbered_path(dir: &Path, filename: &str) -> PathBuf {
    let mut n: u64 = 1;
    loop {
        let candidate = numbered_path(dir, filename, n);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ==================== Sanitize Tests ====================

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("file/name.jpg"), "file_name.jpg");
        assert_eq!(sanitize_filename("file\\name.jpg"), "file_name.jpg");
        assert_eq!(sanitize_filename("file:name.jpg"), "file_name.jpg");
        assert_eq!(sanitize_filename("file<name>.jpg"), "file_name_.jpg");
        assert_eq!(sanitize_filename("Cat / #general"), "Cat _ #general");
    }

    #[test]
    fn test_sanitize_filename_rewrites_dot_segments() {
        assert_eq!(sanitize_filename("."), "_");
        assert_eq!(sanitize_filename(".."), "__");
        assert_eq!(sanitize_filename("   "), "_");
    }

    #[test]
    fn test_sanitize_filename_preserves_valid_chars() {
        assert_eq!(sanitize_filename("Guild A"), "Guild A");
        assert_eq!(sanitize_filename("ann#0042"), "ann#0042");
        assert_eq!(sanitize_filename("日本語.png"), "日本語.png");
    }

    // ==================== Content-Disposition Tests ====================

    #[test]
    fn test_parse_content_disposition_quoted() {
        assert_eq!(
            parse_content_disposition(r#"attachment; filename="photo.jpg""#),
            Some("photo.jpg".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_unquoted_with_semicolon() {
        assert_eq!(
            parse_content_disposition("attachment; filename=photo.jpg; size=10"),
            Some("photo.jpg".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_percent_encoded() {
        assert_eq!(
            parse_content_disposition(r#"inline; filename="my%20photo.jpg""#),
            Some("my photo.jpg".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_rfc5987() {
        assert_eq!(
            parse_content_disposition("attachment; filename*=UTF-8''na%C3%AFve.png"),
            Some("naïve.png".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_missing() {
        assert_eq!(parse_content_disposition("inline"), None);
        assert_eq!(parse_content_disposition(r#"attachment; filename="""#), None);
    }

    // ==================== URL Filename Tests ====================

    #[test]
    fn test_filename_from_url_uses_last_segment_decoded() {
        let url = Url::parse("https://cdn.example.com/a/b/cool%20cat.png?x=1").unwrap();
        assert_eq!(filename_from_url(&url), "cool cat.png");
    }

    #[test]
    fn test_filename_from_url_empty_path_falls_back() {
        let url = Url::parse("https://example.com/").unwrap();
        assert!(filename_from_url(&url).starts_with("download_"));
    }

    // ==================== Extension Tests ====================

    #[test]
    fn test_extension_of_lowercases() {
        assert_eq!(extension_of("A.JPG"), ".jpg");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("noext"), "");
    }

    #[test]
    fn test_extension_for_content_type_preferred() {
        assert_eq!(
            extension_for_content_type("image/jpeg").as_deref(),
            Some(".jpg")
        );
        assert_eq!(
            extension_for_content_type("text/plain; charset=utf-8").as_deref(),
            Some(".txt")
        );
    }

    #[test]
    fn test_extension_for_content_type_falls_back_to_mime_guess() {
        let ext = extension_for_content_type("application/json").unwrap();
        assert_eq!(ext, ".json");
        assert!(extension_for_content_type("application/x-nothing-known").is_none());
    }

    // ==================== Length / Rewrite Tests ====================

    #[test]
    fn test_truncate_long_filename_keeps_extension() {
        let long = format!("{}.png", "a".repeat(300));
        let truncated = truncate_long_filename(&long, ".png");
        assert_eq!(truncated.len(), 254);
        assert!(truncated.ends_with(".png"));
        assert!(truncated.starts_with(&"a".repeat(250)));
    }

    #[test]
    fn test_truncate_long_filename_threshold() {
        let just_under = "a".repeat(259);
        assert_eq!(truncate_long_filename(&just_under, ""), just_under);
        let at_limit = "a".repeat(260);
        assert_eq!(truncate_long_filename(&at_limit, "").len(), 250);
    }

    #[test]
    fn test_normalize_jfif() {
        assert_eq!(
            normalize_jfif("pic.jfif", ".jfif"),
            ("pic.jpg".to_string(), ".jpg".to_string())
        );
        assert_eq!(
            normalize_jfif("pic.png", ".png"),
            ("pic.png".to_string(), ".png".to_string())
        );
    }

    #[test]
    fn test_apply_date_prefix() {
        let time = DateTime::parse_from_rfc3339("2024-02-03T04:05:06Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            apply_date_prefix("a.jpg", "%Y-%m-%d_%H-%M-%S ", time),
            "2024-02-03_04-05-06 a.jpg"
        );
    }

    // ==================== Collision Tests ====================

    #[test]
    fn test_numbered_path_keeps_extension_last() {
        let dir = Path::new("/out");
        assert_eq!(numbered_path(dir, "a.tar.gz", 2), PathBuf::from("/out/a.tar-2.gz"));
        assert_eq!(numbered_path(dir, ".hidden", 1), PathBuf::from("/out/.hidden-1"));
    }

    #[test]
    fn test_next_free_numbered_path_starts_at_one() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        assert_eq!(
            next_free_numbered_path(dir.path(), "a.jpg"),
            dir.path().join("a-1.jpg")
        );
        std::fs::write(dir.path().join("a-1.jpg"), b"x").unwrap();
        assert_eq!(
            next_free_numbered_path(dir.path(), "a.jpg"),
            dir.path().join("a-2.jpg")
        );
    }

    #[test]
    fn test_next_free_numbered_path_without_extension() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            next_free_numbered_path(dir.path(), "README"),
            dir.path().join("README-1")
        );
    }
}
