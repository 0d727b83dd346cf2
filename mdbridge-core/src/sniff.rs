// ABOUTME: Content-type detection from leading bytes (WHATWG MIME sniffing subset).
// ABOUTME: Used instead of file extensions so renamed files are classified correctly.

use mime_guess::mime::{self, Mime};

/// Only this many leading bytes are considered
pub const SNIFF_LEN: usize = 512;

/// Markup tags that identify HTML after optional leading whitespace
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

/// Exact prefixes, checked in order
const PREFIXES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"\xFE\xFF", "text/plain; charset=utf-16be"),
    (b"\xFF\xFE", "text/plain; charset=utf-16le"),
    (b"\xEF\xBB\xBF", "text/plain; charset=utf-8"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x00\x00\x02\x00", "image/x-icon"),
    (b"BM", "image/bmp"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"ID3", "audio/mpeg"),
    (b"OggS\x00", "application/ogg"),
    (b"MThd\x00\x00\x00\x06", "audio/midi"),
    (b"\x1A\x45\xDF\xA3", "video/webm"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"PK\x03\x04", "application/zip"),
    (b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    (b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    (b"\x00\x61\x73\x6D", "application/wasm"),
];

/// RIFF/IFF containers: (container magic, form type at offset 8, content type)
const CONTAINERS: &[(&[u8], &[u8], &str)] = &[
    (b"RIFF", b"WEBPVP", "image/webp"),
    (b"RIFF", b"AVI ", "video/avi"),
    (b"RIFF", b"WAVE", "audio/wave"),
    (b"FORM", b"AIFF", "audio/aiff"),
];

/// Detect the content type of `data`.
///
/// Always returns a valid type; unrecognised binary data is
/// `application/octet-stream`.
pub fn sniff_content_type(data: &[u8]) -> Mime {
    let data = &data[..data.len().min(SNIFF_LEN)];
    parse_or_octet(sniff_str(data))
}

fn sniff_str(data: &[u8]) -> &'static str {
    let trimmed = skip_whitespace(data);
    if HTML_TAGS.iter().any(|tag| matches_html_tag(trimmed, tag)) {
        return "text/html; charset=utf-8";
    }
    if trimmed.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }

    if let Some((_, ct)) = PREFIXES.iter().find(|(magic, _)| data.starts_with(magic)) {
        return *ct;
    }

    for &(magic, form, ct) in CONTAINERS {
        if data.len() >= 8 + form.len() && data.starts_with(magic) && &data[8..8 + form.len()] == form
        {
            return ct;
        }
    }

    if is_mp4(data) {
        return "video/mp4";
    }

    if !data.iter().any(|b| is_binary_byte(*b)) {
        return "text/plain; charset=utf-8";
    }

    "application/octet-stream"
}

fn parse_or_octet(ct: &str) -> Mime {
    ct.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

fn skip_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

/// Case-insensitive tag match followed by a tag-terminating byte
fn matches_html_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() < tag.len() + 1 {
        return false;
    }
    if !data[..tag.len()].eq_ignore_ascii_case(tag) {
        return false;
    }
    matches!(data[tag.len()], b' ' | b'>')
}

/// ISO base media file with an `mp4` major or compatible brand
fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < box_size || box_size % 4 != 0 || &data[4..8] != b"ftyp" {
        return false;
    }
    (8..box_size)
        .step_by(4)
        .filter(|&start| start != 12)
        .any(|start| start + 3 <= data.len() && &data[start..start + 3] == b"mp4")
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00\x01";

    #[test]
    fn test_jpeg() {
        assert_eq!(sniff_content_type(JPEG), mime::IMAGE_JPEG);
    }

    #[test]
    fn test_png_is_not_jpeg() {
        let png = b"\x89PNG\x0D\x0A\x1A\x0A\x00\x00\x00\x0DIHDR";
        assert_eq!(sniff_content_type(png), mime::IMAGE_PNG);
    }

    #[test]
    fn test_pdf_and_zip() {
        assert_eq!(sniff_content_type(b"%PDF-1.7\n").essence_str(), "application/pdf");
        assert_eq!(
            sniff_content_type(b"PK\x03\x04\x14\x00").essence_str(),
            "application/zip"
        );
    }

    #[test]
    fn test_plain_text_has_charset() {
        let ct = sniff_content_type(b"just some notes\n");
        assert_eq!(ct.essence_str(), "text/plain");
        assert_eq!(ct.get_param(mime::CHARSET), Some(mime::UTF_8));
    }

    #[test]
    fn test_html_after_whitespace() {
        let ct = sniff_content_type(b"  \n<html><body>hi</body></html>");
        assert_eq!(ct.essence_str(), "text/html");
        // tag must be terminated
        assert_eq!(sniff_content_type(b"<htmlx").essence_str(), "text/plain");
    }

    #[test]
    fn test_riff_containers() {
        assert_eq!(
            sniff_content_type(b"RIFF\x24\x00\x00\x00WAVEfmt ").essence_str(),
            "audio/wave"
        );
        assert_eq!(
            sniff_content_type(b"RIFF\x24\x00\x00\x00WEBPVP8 ").essence_str(),
            "image/webp"
        );
    }

    #[test]
    fn test_mp4() {
        let mut data = vec![0x00, 0x00, 0x00, 0x1C];
        data.extend_from_slice(b"ftypisom\x00\x00\x02\x00isomiso2mp41");
        assert_eq!(sniff_content_type(&data).essence_str(), "video/mp4");
    }

    #[test]
    fn test_binary_falls_back_to_octet_stream() {
        assert_eq!(
            sniff_content_type(b"\x00\x01\x02\x03garbage"),
            mime::APPLICATION_OCTET_STREAM
        );
    }

    #[test]
    fn test_empty_is_text() {
        assert_eq!(sniff_content_type(b"").essence_str(), "text/plain");
    }

}
