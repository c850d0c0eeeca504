//! Error types for nested-extract
//!
//! Failures of a single archive never abort a traversal; they end up as the
//! [`ArchiveResult::Failed`](crate::types::ArchiveResult::Failed) reason of that
//! file. [`Error`] covers what does propagate: configuration problems, I/O on
//! the traversal itself, and a missing external tool, which must stop a
//! credential search outright.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for nested-extract operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for nested-extract
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "target_directory")
        key: Option<String>,
    },

    /// Extraction-related error
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a keyed configuration error
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// `true` when this error means the external extraction program is absent
    pub fn is_tool_not_found(&self) -> bool {
        matches!(
            self,
            Error::Extraction(ExtractionError::ToolNotFound { .. })
        )
    }
}

/// Extraction errors (per archive)
///
/// Also used as the terminal failure reason of one archive, which is why the
/// type is `Clone`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// Archive extraction failed
    #[error("extraction failed for {archive}: {reason}")]
    ExtractionFailed {
        /// The archive file that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// None of the configured encodings could decode the archive metadata
    #[error("no configured encoding ({encodings}) can decode the entry names of {archive}")]
    WrongEncoding {
        /// The archive whose metadata could not be decoded
        archive: PathBuf,
        /// Comma separated list of the encodings that were tried
        encodings: String,
    },

    /// All passwords failed for archive extraction
    #[error("all {count} passwords failed for archive {archive}")]
    AllPasswordsFailed {
        /// The archive that could not be opened
        archive: PathBuf,
        /// The number of passwords that were tried
        count: usize,
    },

    /// The external decompression program is not installed or not on PATH
    #[error("{tool} not found, make sure it is installed and available in PATH")]
    ToolNotFound {
        /// Name of the missing program
        tool: String,
    },

    /// File rename failed during remediation
    #[error("failed to rename {source_path} to {dest_path}: {reason}")]
    RenameFailed {
        /// The file being renamed
        source_path: PathBuf,
        /// The name it should have received
        dest_path: PathBuf,
        /// The reason the rename failed
        reason: String,
    },
}
