//! Archive type classification by content sniffing
//!
//! Only the leading [`SNIFF_LEN`] bytes of a file are read. Sniffing yields a
//! MIME type and [`ArchiveKind::from_mime`] maps it to an archive kind; no
//! extension-based heuristics are applied, since upstream distributors
//! routinely rename archives.

use crate::types::ArchiveKind;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Number of leading bytes inspected
pub const SNIFF_LEN: usize = 2048;

const MIME_OCTET_STREAM: &str = "application/octet-stream";
const MIME_TEXT: &str = "text/plain";

/// Signatures at offset 0, most specific first
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"PK\x03\x04", "application/zip"),
    (b"PK\x05\x06", "application/zip"),
    (b"PK\x07\x08", "application/zip"),
    (b"7z\xBC\xAF\x27\x1C", "application/x-7z-compressed"),
    (b"Rar!\x1A\x07\x01\x00", "application/x-rar"),
    (b"Rar!\x1A\x07\x00", "application/x-rar"),
    (b"\x1F\x8B", "application/gzip"),
    (b"BZh", "application/x-bzip2"),
    (b"\xFD7zXZ\x00", "application/x-xz"),
    (b"\x28\xB5\x2F\xFD", "application/zstd"),
    (b"%PDF-", "application/pdf"),
    (b"\x89PNG\r\n\x1A\n", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"GIF8", "image/gif"),
    (b"\x7FELF", "application/x-executable"),
];

const MIME_ZIP: &str = "application/zip";
const LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const LOCAL_HEADER_LEN: usize = 30;

/// `mimetype` payload prefixes of ZIP-based document formats (EPUB, OpenDocument)
const MIMETYPE_PAYLOADS: &[(&[u8], &str)] = &[
    (b"application/epub+zip", "application/epub+zip"),
    (
        b"application/vnd.oasis.opendocument.",
        "application/vnd.oasis.opendocument",
    ),
];

/// Part directories of Office Open XML packages
const OOXML_PARTS: &[(&str, &str)] = &[
    (
        "word/",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    (
        "xl/",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    (
        "ppt/",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
];
const MIME_OOXML: &str = "application/vnd.openxmlformats-officedocument";
const MIME_JAR: &str = "application/java-archive";
const MIME_APK: &str = "application/vnd.android.package-archive";

/// POSIX / GNU tar magic lives at offset 257 of the first header block
const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8] = b"ustar";

/// Sniff a MIME type from a file's leading bytes
///
/// Unrecognized binary content is `application/octet-stream`, printable
/// UTF-8 is `text/plain`.
pub fn sniff_mime(header: &[u8]) -> &'static str {
    if let Some((_, mime)) = SIGNATURES.iter().find(|(sig, _)| header.starts_with(sig)) {
        if *mime == MIME_ZIP && header.starts_with(LOCAL_HEADER) {
            return zip_container_mime(header);
        }
        return *mime;
    }

    if header
        .get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len())
        .is_some_and(|magic| magic == TAR_MAGIC)
    {
        return "application/x-tar";
    }

    if looks_like_text(header) {
        MIME_TEXT
    } else {
        MIME_OCTET_STREAM
    }
}

/// One local file header found in the sniff window
struct LocalEntry<'a> {
    name: &'a [u8],
    /// Stored data, cut at the window end
    data: &'a [u8],
}

/// Parse the local file header at `offset`, `None` if it does not fit the window
fn local_entry(header: &[u8], offset: usize) -> Option<LocalEntry<'_>> {
    let fixed = header.get(offset..offset + LOCAL_HEADER_LEN)?;
    let field = |at: usize| usize::from(u16::from_le_bytes([fixed[at], fixed[at + 1]]));
    let compressed_size =
        u32::from_le_bytes([fixed[18], fixed[19], fixed[20], fixed[21]]) as usize;
    let name_start = offset + LOCAL_HEADER_LEN;
    let name = header.get(name_start..name_start + field(26))?;
    let data_start = (name_start + field(26) + field(28)).min(header.len());
    let data_end = data_start.saturating_add(compressed_size).min(header.len());
    Some(LocalEntry {
        name,
        data: &header[data_start..data_end],
    })
}

/// Tell generic ZIP archives apart from ZIP-based document and package formats
///
/// Like libmagic, this looks at the entry names visible in the sniff window:
/// a leading `mimetype` entry (EPUB, OpenDocument), `[Content_Types].xml`
/// (Office Open XML), a leading `META-INF/` entry (JAR) or an
/// `AndroidManifest.xml` entry (APK).
fn zip_container_mime(header: &[u8]) -> &'static str {
    let entries: Vec<LocalEntry<'_>> = header
        .windows(LOCAL_HEADER.len())
        .enumerate()
        .filter(|(_, w)| *w == LOCAL_HEADER)
        .filter_map(|(offset, _)| local_entry(header, offset))
        .collect();
    let Some(first) = entries.first() else {
        return MIME_ZIP;
    };

    if first.name == b"mimetype"
        && let Some((_, mime)) = MIMETYPE_PAYLOADS
            .iter()
            .find(|(payload, _)| first.data.starts_with(payload))
    {
        return *mime;
    }

    let has = |name: &[u8]| entries.iter().any(|e| e.name == name);
    if has(b"[Content_Types].xml".as_slice()) {
        return OOXML_PARTS
            .iter()
            .find(|(dir, _)| entries.iter().any(|e| e.name.starts_with(dir.as_bytes())))
            .map_or(MIME_OOXML, |(_, mime)| *mime);
    }
    if has(b"AndroidManifest.xml".as_slice()) {
        return MIME_APK;
    }
    if first.name.starts_with(b"META-INF/") {
        return MIME_JAR;
    }
    MIME_ZIP
}

/// `true` when the bytes are UTF-8 without control characters other than whitespace
///
/// A multi-byte sequence cut off by the sniff window is tolerated.
fn looks_like_text(header: &[u8]) -> bool {
    if header.is_empty() {
        return false;
    }
    let valid = match std::str::from_utf8(header) {
        Ok(s) => s,
        Err(e) if e.error_len().is_none() => {
            // Truncated trailing sequence, the prefix is valid by construction
            match std::str::from_utf8(&header[..e.valid_up_to()]) {
                Ok(s) => s,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };
    valid
        .chars()
        .all(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t' | '\x0C'))
}

/// Classify raw leading bytes
pub fn classify_bytes(header: &[u8]) -> Option<ArchiveKind> {
    ArchiveKind::from_mime(sniff_mime(header))
}

/// Read up to [`SNIFF_LEN`] bytes of a file (read-only) and classify them
///
/// Returns `Ok(None)` for ordinary, non-archive content.
pub fn detect_archive_kind(path: &Path) -> io::Result<Option<ArchiveKind>> {
    let file = File::open(path)?;
    let mut header = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut header)?;
    Ok(classify_bytes(&header))
}
