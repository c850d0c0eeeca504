//! Core types and events

use crate::error::ExtractionError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Archive kind, derived from content sniffing only (never from the file name)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    /// POSIX tar archive
    Tar,
    /// ZIP archive
    Zip,
    /// 7-Zip archive
    SevenZip,
    /// RAR archive (v4 or v5)
    Rar,
}

impl ArchiveKind {
    /// All kinds, in classification table order
    pub const ALL: [ArchiveKind; 4] = [
        ArchiveKind::Tar,
        ArchiveKind::Zip,
        ArchiveKind::SevenZip,
        ArchiveKind::Rar,
    ];

    /// Short display suffix ("tar", "zip", "7z", "rar")
    pub fn suffix(self) -> &'static str {
        match self {
            ArchiveKind::Tar => "tar",
            ArchiveKind::Zip => "zip",
            ArchiveKind::SevenZip => "7z",
            ArchiveKind::Rar => "rar",
        }
    }

    /// MIME type reported by content sniffing for this kind
    pub fn mime(self) -> &'static str {
        match self {
            ArchiveKind::Tar => "application/x-tar",
            ArchiveKind::Zip => "application/zip",
            ArchiveKind::SevenZip => "application/x-7z-compressed",
            ArchiveKind::Rar => "application/x-rar",
        }
    }

    /// Map a sniffed MIME type to an archive kind, `None` if it is not an archive
    pub fn from_mime(mime: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.mime() == mime)
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Classified result of one backend call with one credential
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// Archive fully extracted to the output location
    Success,
    /// Credential rejected, try the next password
    WrongPassword,
    /// No configured encoding could decode the archive metadata for this password
    WrongEncoding,
    /// Any other backend failure (corruption, unsupported feature, I/O)
    Failure,
}

impl ExtractionOutcome {
    /// `true` for the outcomes that mean "advance to the next credential"
    pub fn is_credential_error(self) -> bool {
        matches!(
            self,
            ExtractionOutcome::WrongPassword | ExtractionOutcome::WrongEncoding
        )
    }
}

/// One archive scheduled for extraction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveTask {
    /// Path of the archive (first volume for split archives)
    pub path: PathBuf,
    /// Kind determined by content sniffing
    pub kind: ArchiveKind,
    /// Recursion depth: 0 for the target directory, +1 per nested output
    pub level: u32,
}

impl ArchiveTask {
    /// Create a task
    pub fn new(path: impl Into<PathBuf>, kind: ArchiveKind, level: u32) -> Self {
        Self {
            path: path.into(),
            kind,
            level,
        }
    }

    /// Deterministic output directory of this archive
    pub fn output_location(&self) -> PathBuf {
        crate::utils::output_location(&self.path)
    }
}

/// Terminal result of one archive's extraction attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArchiveResult {
    /// Extracted during this run
    Extracted {
        /// Output directory holding the extracted contents
        output: PathBuf,
        /// The password that matched (empty for unprotected archives)
        password: String,
        /// Wall-clock time of the whole credential search
        elapsed: Duration,
    },
    /// Output directory already existed, nothing was attempted
    AlreadyExtracted {
        /// Existing output directory
        output: PathBuf,
    },
    /// No credential succeeded, no output directory is left behind
    Failed(ExtractionError),
}

impl ArchiveResult {
    /// Output directory to recurse into, if the archive counts as extracted
    pub fn output(&self) -> Option<&Path> {
        match self {
            ArchiveResult::Extracted { output, .. } | ArchiveResult::AlreadyExtracted { output } => {
                Some(output)
            }
            ArchiveResult::Failed(_) => None,
        }
    }
}

/// Files in one directory whose names contain unwanted substrings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenameCandidate {
    /// The flagged directory
    pub dir: PathBuf,
    /// Names of the offending files, sorted
    pub files: Vec<String>,
}

/// Progress event emitted to the console sink
///
/// These are advisory and not a machine-readable protocol; the terminal
/// renderer in [`crate::console`] turns them into indented progress lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Extraction of an archive is starting
    Extracting {
        /// Archive path
        archive: PathBuf,
        /// Sniffed kind
        kind: ArchiveKind,
        /// Recursion depth
        level: u32,
    },

    /// Archive skipped because its output directory already exists
    Skipping {
        /// Archive path
        archive: PathBuf,
        /// Sniffed kind
        kind: ArchiveKind,
        /// Recursion depth
        level: u32,
    },

    /// A credential is about to be tried
    TryingPassword {
        /// Recursion depth
        level: u32,
        /// The password (empty for the implicit first attempt)
        password: String,
    },

    /// Archive extracted successfully
    Extracted {
        /// Archive path
        archive: PathBuf,
        /// Output directory
        output: PathBuf,
        /// Matching password
        password: String,
        /// Time spent on the credential search
        elapsed: Duration,
        /// Recursion depth
        level: u32,
    },

    /// Archive could not be extracted
    Failed {
        /// Archive path
        archive: PathBuf,
        /// Recursion depth
        level: u32,
        /// Why every credential failed
        reason: ExtractionError,
    },

    /// Directories with files that probably need renaming
    RenameCandidates {
        /// Findings per directory
        candidates: Vec<RenameCandidate>,
    },

    /// A file was renamed
    Renamed {
        /// Old path
        from: PathBuf,
        /// New path
        to: PathBuf,
    },

    /// A proposed rename was declined
    RenameSkipped {
        /// Path that keeps its name
        path: PathBuf,
    },

    /// A rename failed (e.g. name collision); the batch continues
    RenameFailed {
        /// The failure
        error: ExtractionError,
    },

    /// Extraction is re-run in the remediated directories
    Retrying {
        /// Directories that are traversed again
        dirs: Vec<PathBuf>,
    },
}
