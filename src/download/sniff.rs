//! Content-type sniffing from response bytes.
//!
//! Server-declared types are unreliable for media CDNs, so classification is
//! done on the body itself. Only the first 512 bytes are examined.

/// Number of leading bytes considered.
const SNIFF_LEN: usize = 512;

/// Fallback for unrecognized binary data.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Exact-prefix signatures.
const PREFIX_SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"BM", "image/bmp"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x00\x00\x02\x00", "image/x-icon"),
    (b"8BPS", "image/vnd.adobe.photoshop"),
    (b"ID3", "audio/mpeg"),
    (b"OggS\x00", "application/ogg"),
    (b"MThd\x00\x00\x00\x06", "audio/midi"),
    (b"fLaC", "audio/flac"),
    (b"\x1A\x45\xDF\xA3", "video/webm"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"Rar!\x1A\x07", "application/x-rar-compressed"),
    (b"\x00asm", "application/wasm"),
];

/// Tags that mark a document as HTML when they open it (case-insensitive).
const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Detects the MIME type of `data`, always returning a valid `type/subtype`.
#[must_use]
pub fn detect_content_type(data: &[u8]) -> String {
    let data = &data[..data.len().min(SNIFF_LEN)];

    let first_non_ws = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | 0x0C | b'\r' | b' '))
        .unwrap_or(data.len());
    let trimmed = &data[first_non_ws..];

    if HTML_TAGS.iter().any(|tag| matches_html_tag(trimmed, tag)) {
        return "text/html; charset=utf-8".to_string();
    }
    if starts_with_ignore_case(trimmed, b"<?xml") {
        return "text/xml; charset=utf-8".to_string();
    }

    if let Some((_, mime)) = PREFIX_SIGNATURES
        .iter()
        .find(|(signature, _)| data.starts_with(signature))
    {
        return (*mime).to_string();
    }

    if let Some(mime) = sniff_riff(data) {
        return mime.to_string();
    }
    if is_iso_media(data) {
        return "video/mp4".to_string();
    }

    if data.starts_with(b"\xEF\xBB\xBF") || !data.iter().any(|b| is_binary_byte(*b)) {
        return "text/plain; charset=utf-8".to_string();
    }

    OCTET_STREAM.to_string()
}

/// The class part of a MIME type (`image` for `image/png`).
#[must_use]
pub fn content_class(content_type: &str) -> &str {
    content_type.split('/').next().unwrap_or_default()
}

/// Returns true when the sniffed type is HTML.
#[must_use]
pub fn is_html(content_type: &str) -> bool {
    content_type.contains("text/html")
}

fn matches_html_tag(data: &[u8], tag: &[u8]) -> bool {
    if !starts_with_ignore_case(data, tag) {
        return false;
    }
    // The tag must be terminated by a space or '>'.
    matches!(data.get(tag.len()), Some(b' ' | b'>'))
}

fn starts_with_ignore_case(data: &[u8], prefix: &[u8]) -> bool {
    data.len() >= prefix.len() && data[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn sniff_riff(data: &[u8]) -> Option<&'static str> {
    if data.len() < 12 || &data[..4] != b"RIFF" {
        return None;
    }
    match &data[8..12] {
        b"WEBP" => Some("image/webp"),
        b"WAVE" => Some("audio/wave"),
        b"AVI " => Some("video/avi"),
        _ => None,
    }
}

fn is_iso_media(data: &[u8]) -> bool {
    if data.len() < 12 || &data[4..8] != b"ftyp" {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    box_size % 4 == 0 && box_size >= 12
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}
