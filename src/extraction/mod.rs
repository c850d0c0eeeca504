//! Archive extraction with password and encoding search
//!
//! This module classifies files by content, dispatches each archive kind to
//! its backend (the `zip` library for ZIP, the external `7z` program for the
//! rest) and runs the ordered credential search for one archive.

mod detect;
mod external;
mod password_list;
mod shared;
mod zip;
pub mod zipcrypto;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

// Re-exports
pub use detect::{SNIFF_LEN, classify_bytes, detect_archive_kind, sniff_mime};
pub use external::{SevenZipCli, WRONG_PASSWORD_MARKER, is_password_error};
pub use password_list::PasswordList;
pub use shared::extract_archive;
pub use zip::ZipBackend;

use crate::config::Config;
use crate::error::Result;
use crate::types::{ArchiveKind, ExtractionOutcome};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// One extraction strategy
///
/// A backend tries exactly one password. An empty password means "no
/// password". On every outcome other than [`ExtractionOutcome::Success`] the
/// backend leaves no `dest_path` behind.
///
/// `Err` is reserved for conditions that must stop the credential search
/// for this archive, most importantly a missing external program
/// ([`crate::error::ExtractionError::ToolNotFound`]).
#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    /// Extract `archive_path` into `dest_path` with one password
    async fn extract(
        &self,
        archive_path: &Path,
        dest_path: &Path,
        password: &str,
    ) -> Result<ExtractionOutcome>;

    /// Short backend name for logging
    fn name(&self) -> &'static str;
}

/// Backend dispatcher
///
/// ZIP goes to the library backend (which itself falls back to the external
/// backend on unsupported features); tar, 7z and RAR go to the external
/// backend directly.
#[derive(Clone)]
pub struct Backends {
    zip: Arc<dyn ArchiveBackend>,
    external: Arc<dyn ArchiveBackend>,
    zip_encodings: String,
}

impl Backends {
    /// Build the production backends from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let external: Arc<dyn ArchiveBackend> = Arc::new(SevenZipCli::from_config(&config.tools));
        let zip = ZipBackend::new(
            &config.zip_metadata_encodings,
            zipcrypto::strategy_for(config.zip_decryption),
            Arc::clone(&external),
        )?;
        let zip_encodings = zip.encoding_names();

        Ok(Self {
            zip: Arc::new(zip),
            external,
            zip_encodings,
        })
    }

    /// Assemble a dispatcher from arbitrary backends
    pub fn new(
        zip: Arc<dyn ArchiveBackend>,
        external: Arc<dyn ArchiveBackend>,
        zip_encodings: impl Into<String>,
    ) -> Self {
        Self {
            zip,
            external,
            zip_encodings: zip_encodings.into(),
        }
    }

    /// Backend responsible for `kind`
    pub fn for_kind(&self, kind: ArchiveKind) -> &dyn ArchiveBackend {
        match kind {
            ArchiveKind::Zip => self.zip.as_ref(),
            ArchiveKind::Tar | ArchiveKind::SevenZip | ArchiveKind::Rar => self.external.as_ref(),
        }
    }

    /// Encodings the ZIP backend searches, for failure messages
    pub fn zip_encodings(&self) -> &str {
        &self.zip_encodings
    }
}
