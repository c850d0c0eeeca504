use crate::config::DEFAULT_ZIP_ENCODING;
use crate::error::{Error, ExtractionError, Result};
use crate::types::ExtractionOutcome;
use crate::utils::remove_dir_force;
use async_trait::async_trait;
use encoding_rs::Encoding;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

use super::ArchiveBackend;
use super::zipcrypto::{DecryptStrategy, ENCRYPTION_HEADER_LEN, password_matches_header};

const LOCAL_HEADER_LEN: usize = 30;
const FLAG_ENCRYPTED: u16 = 1;
const FLAG_STRONG_ENCRYPTION: u16 = 1 << 6;
const METHOD_AES: u16 = 99;

/// Result of one extraction pass with one password under one encoding
#[derive(Debug)]
enum ZipAttempt {
    Extracted,
    WrongPassword,
    /// Entry names or the password cannot be represented in this encoding
    Undecodable,
    /// The library cannot handle a feature of this archive (compression method, ...)
    Unsupported(String),
    Failed(String),
}

/// Library backend for ZIP archives
///
/// Searches the configured name encodings in order (the default UTF-8
/// encoding last) for one password, and hands archives using features the
/// library does not support to the `fallback` backend.
pub struct ZipBackend {
    encodings: Vec<&'static Encoding>,
    strategy: Arc<dyn DecryptStrategy>,
    fallback: Arc<dyn ArchiveBackend>,
}

impl ZipBackend {
    /// Create a backend from WHATWG encoding labels
    ///
    /// Unknown labels are rejected. [`DEFAULT_ZIP_ENCODING`] is appended
    /// unless the list already contains it; repeated encodings are dropped.
    pub fn new(
        labels: &[String],
        strategy: Arc<dyn DecryptStrategy>,
        fallback: Arc<dyn ArchiveBackend>,
    ) -> Result<Self> {
        let mut encodings = Vec::with_capacity(labels.len() + 1);
        for label in labels
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(DEFAULT_ZIP_ENCODING))
        {
            let encoding = Encoding::for_label(label.as_bytes()).ok_or_else(|| {
                Error::config(
                    "zip_metadata_encodings",
                    format!("unknown encoding label: {label}"),
                )
            })?;
            if !encodings.contains(&encoding) {
                encodings.push(encoding);
            }
        }

        debug!(
            encodings = ?encodings.iter().map(|e| e.name()).collect::<Vec<_>>(),
            strategy = strategy.name(),
            "zip backend configured"
        );

        Ok(Self {
            encodings,
            strategy,
            fallback,
        })
    }

    /// Comma separated names of the encodings that are tried, in order
    pub fn encoding_names(&self) -> String {
        self.encodings
            .iter()
            .map(|e| e.name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Try every encoding for one password (blocking)
    fn extract_blocking(
        archive_path: &Path,
        dest_path: &Path,
        password: &str,
        encodings: &[&'static Encoding],
        strategy: &dyn DecryptStrategy,
    ) -> ZipAttempt {
        let (mut raw, mut archive) = match open_archive(archive_path) {
            Ok(pair) => pair,
            Err(e) => return ZipAttempt::Failed(format!("failed to read ZIP archive: {e}")),
        };

        for encoding in encodings {
            let password_bytes = match encode_password(password, encoding) {
                Some(bytes) => bytes,
                None => {
                    debug!(encoding = encoding.name(), "password not representable");
                    continue;
                }
            };

            let entries = match decode_entry_names(&mut archive, &mut raw, encoding) {
                Ok(Some(entries)) => entries,
                Ok(None) => {
                    debug!(
                        ?archive_path,
                        encoding = encoding.name(),
                        "entry names do not decode, trying next encoding"
                    );
                    continue;
                }
                Err(e) => return ZipAttempt::Failed(e),
            };

            if !password_bytes.is_empty() {
                match prescreen_password(&mut raw, &entries, &password_bytes, strategy) {
                    Ok(true) => {}
                    Ok(false) => return ZipAttempt::WrongPassword,
                    Err(e) => return ZipAttempt::Failed(e),
                }
            }

            let attempt = extract_entries(&mut archive, &entries, dest_path, &password_bytes);
            if !matches!(attempt, ZipAttempt::Extracted)
                && let Err(e) = remove_dir_force(dest_path)
            {
                warn!(?dest_path, error = %e, "failed to remove partial output");
            }
            if matches!(attempt, ZipAttempt::Extracted) {
                debug!(?archive_path, encoding = encoding.name(), "ZIP extraction successful");
            }
            return attempt;
        }

        ZipAttempt::Undecodable
    }
}

#[async_trait]
impl ArchiveBackend for ZipBackend {
    async fn extract(
        &self,
        archive_path: &Path,
        dest_path: &Path,
        password: &str,
    ) -> Result<ExtractionOutcome> {
        let archive_owned = archive_path.to_path_buf();
        let dest_owned = dest_path.to_path_buf();
        let password_owned = password.to_string();
        let encodings = self.encodings.clone();
        let strategy = Arc::clone(&self.strategy);

        let attempt = spawn_blocking(move || {
            Self::extract_blocking(
                &archive_owned,
                &dest_owned,
                &password_owned,
                &encodings,
                strategy.as_ref(),
            )
        })
        .await
        .map_err(|e| {
            Error::Extraction(ExtractionError::ExtractionFailed {
                archive: archive_path.to_path_buf(),
                reason: format!("extraction task panicked: {}", e),
            })
        })?;

        match attempt {
            ZipAttempt::Extracted => Ok(ExtractionOutcome::Success),
            ZipAttempt::WrongPassword => Ok(ExtractionOutcome::WrongPassword),
            ZipAttempt::Undecodable => Ok(ExtractionOutcome::WrongEncoding),
            ZipAttempt::Unsupported(reason) => {
                info!(
                    ?archive_path,
                    %reason,
                    fallback = self.fallback.name(),
                    "ZIP feature not supported by library, falling back"
                );
                self.fallback.extract(archive_path, dest_path, password).await
            }
            ZipAttempt::Failed(reason) => {
                warn!(?archive_path, %reason, "ZIP extraction failed");
                Ok(ExtractionOutcome::Failure)
            }
        }
    }

    fn name(&self) -> &'static str {
        "zip-library"
    }
}

/// One archive entry with its decoded, sanitized location
struct EntryInfo {
    /// Relative output path, `None` for entries with an unsafe name
    path: Option<PathBuf>,
    is_dir: bool,
    /// Encrypted with any method
    encrypted: bool,
    /// Encrypted with traditional PKWARE encryption
    zipcrypto: bool,
    dos_time: u16,
    data_start: u64,
    crc32: u32,
}

/// Open the archive plus an independent handle for reading raw headers
fn open_archive(path: &Path) -> std::result::Result<(File, ::zip::ZipArchive<File>), String> {
    let raw = File::open(path).map_err(|e| e.to_string())?;
    let file = File::open(path).map_err(|e| e.to_string())?;
    let archive = ::zip::ZipArchive::new(file).map_err(|e| e.to_string())?;
    Ok((raw, archive))
}

/// Encode the password for an encoding, `None` if a character is unmappable
fn encode_password(password: &str, encoding: &'static Encoding) -> Option<Vec<u8>> {
    let (bytes, _, had_errors) = encoding.encode(password);
    (!had_errors).then(|| bytes.into_owned())
}

/// `true` when the raw name was stored with the UTF-8 flag
///
/// The library decodes flagged names as UTF-8 and everything else as CP437,
/// so a non-ASCII name whose library reading equals its UTF-8 reading carries
/// the flag.
fn is_utf8_flagged(raw: &[u8], library_name: &str) -> bool {
    !raw.is_ascii() && std::str::from_utf8(raw).is_ok_and(|s| s == library_name)
}

fn decode_name(raw: &[u8], library_name: &str, encoding: &'static Encoding) -> Option<String> {
    if raw.is_ascii() || is_utf8_flagged(raw, library_name) {
        return Some(library_name.to_string());
    }
    encoding
        .decode_without_bom_handling_and_without_replacement(raw)
        .map(|name| name.into_owned())
}

/// Turn an entry name into a relative path, rejecting absolute and `..` names
fn sanitize_entry_name(name: &str) -> Option<PathBuf> {
    if name.contains('\0') {
        return None;
    }
    let normalized = name.replace('\\', "/");
    let mut path = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!path.as_os_str().is_empty()).then_some(path)
}

/// Read `(flags, method, dos_time)` from an entry's local file header
fn read_local_header(raw: &mut File, header_start: u64) -> std::io::Result<(u16, u16, u16)> {
    let mut local = [0u8; LOCAL_HEADER_LEN];
    raw.seek(SeekFrom::Start(header_start))?;
    raw.read_exact(&mut local)?;
    Ok((
        u16::from_le_bytes([local[6], local[7]]),
        u16::from_le_bytes([local[8], local[9]]),
        u16::from_le_bytes([local[10], local[11]]),
    ))
}

/// Decode every entry name, `Ok(None)` if one does not decode
fn decode_entry_names(
    archive: &mut ::zip::ZipArchive<File>,
    raw: &mut File,
    encoding: &'static Encoding,
) -> std::result::Result<Option<Vec<EntryInfo>>, String> {
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let (name, header_start, data_start, crc32) = {
            let file = archive
                .by_index_raw(i)
                .map_err(|e| format!("failed to read ZIP entry: {e}"))?;
            let Some(name) = decode_name(file.name_raw(), file.name(), encoding) else {
                return Ok(None);
            };
            (name, file.header_start(), file.data_start(), file.crc32())
        };

        let path = sanitize_entry_name(&name);
        if path.is_none() {
            warn!(entry = %name, "skipping entry with unsafe path");
        }

        let (flags, method, dos_time) = read_local_header(raw, header_start)
            .map_err(|e| format!("failed to read local header: {e}"))?;
        let encrypted = flags & FLAG_ENCRYPTED != 0;

        entries.push(EntryInfo {
            path,
            is_dir: name.ends_with('/'),
            encrypted,
            zipcrypto: encrypted && flags & FLAG_STRONG_ENCRYPTION == 0 && method != METHOD_AES,
            dos_time,
            data_start,
            crc32,
        });
    }
    Ok(Some(entries))
}

/// Check the password against each traditionally encrypted entry's header
///
/// Returns `Ok(false)` on a definitive mismatch.
fn prescreen_password(
    raw: &mut File,
    entries: &[EntryInfo],
    password: &[u8],
    strategy: &dyn DecryptStrategy,
) -> std::result::Result<bool, String> {
    for (index, entry) in entries.iter().enumerate().filter(|(_, e)| e.zipcrypto) {
        let mut header = [0u8; ENCRYPTION_HEADER_LEN];
        raw.seek(SeekFrom::Start(entry.data_start))
            .and_then(|_| raw.read_exact(&mut header))
            .map_err(|e| format!("failed to read encryption header: {e}"))?;

        let check_bytes = [(entry.crc32 >> 24) as u8, (entry.dos_time >> 8) as u8];
        if !password_matches_header(strategy, password, &header, &check_bytes) {
            debug!(entry = index, "password rejected by encryption header");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Extract all entries with an already-encoded password
fn extract_entries(
    archive: &mut ::zip::ZipArchive<File>,
    entries: &[EntryInfo],
    dest_path: &Path,
    password: &[u8],
) -> ZipAttempt {
    if let Err(e) = std::fs::create_dir_all(dest_path) {
        return ZipAttempt::Failed(format!("failed to create destination: {e}"));
    }

    for (i, entry) in entries.iter().enumerate() {
        let Some(relative) = &entry.path else {
            continue;
        };
        let out_path = dest_path.join(relative);

        let opened = if password.is_empty() {
            archive.by_index(i).map(Ok)
        } else {
            archive.by_index_decrypt(i, password)
        };
        let mut file = match opened {
            Ok(Ok(file)) => file,
            Ok(Err(_)) => return ZipAttempt::WrongPassword,
            Err(::zip::result::ZipError::UnsupportedArchive(msg))
                if msg == ::zip::result::ZipError::PASSWORD_REQUIRED =>
            {
                return ZipAttempt::WrongPassword;
            }
            Err(::zip::result::ZipError::UnsupportedArchive(msg)) => {
                return ZipAttempt::Unsupported(msg.to_string());
            }
            Err(e) => return ZipAttempt::Failed(format!("failed to read ZIP entry: {e}")),
        };

        if entry.is_dir {
            if let Err(e) = std::fs::create_dir_all(&out_path) {
                return ZipAttempt::Failed(format!("failed to create directory: {e}"));
            }
            continue;
        }

        if let Some(parent) = out_path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            return ZipAttempt::Failed(format!("failed to create parent directories: {e}"));
        }

        let copied = File::create(&out_path).and_then(|mut out| std::io::copy(&mut file, &mut out));
        if let Err(e) = copied {
            // A wrong ZipCrypto password that slips past the header check
            // surfaces here as a checksum error
            if entry.encrypted {
                debug!(error = %e, "entry data rejected, treating as wrong password");
                return ZipAttempt::WrongPassword;
            }
            return ZipAttempt::Failed(format!("failed to extract file: {e}"));
        }
    }

    ZipAttempt::Extracted
}
