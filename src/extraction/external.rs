//! External `7z` process backend for tar, 7z and RAR archives (and ZIP
//! archives the library cannot handle)

use crate::config::ToolsConfig;
use crate::error::{Error, ExtractionError, Result};
use crate::types::ExtractionOutcome;
use crate::utils::remove_dir_force;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use super::ArchiveBackend;

/// Program names searched for on PATH, in order
pub const SEVENZIP_CANDIDATES: [&str; 3] = ["7z", "7zz", "7za"];

/// Tool name reported when no binary can be resolved
const TOOL_NAME: &str = "7z";

/// Text 7z writes to stderr when the password is rejected
///
/// 7z has no dedicated exit code for a wrong password (it exits with 2, the
/// generic fatal-error code), so the message is matched instead. The child
/// runs with `LC_ALL=C` to keep the text stable.
pub const WRONG_PASSWORD_MARKER: &str = "Wrong password";

/// `true` when stderr output of a failed run signals a rejected password
pub fn is_password_error(stderr: &str) -> bool {
    stderr.contains(WRONG_PASSWORD_MARKER)
}

/// Backend running the external `7z` program
///
/// # Examples
///
/// ```no_run
/// use nested_extract::extraction::{ArchiveBackend, SevenZipCli};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = SevenZipCli::from_path().expect("7z not found in PATH");
/// let outcome = backend
///     .extract(Path::new("movie.rar"), Path::new("movie.rar_out"), "")
///     .await?;
/// println!("{outcome:?}");
/// # Ok(())
/// # }
/// ```
pub struct SevenZipCli {
    binary_path: Option<PathBuf>,
}

impl SevenZipCli {
    /// Create a backend with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path: Some(binary_path),
        }
    }

    /// A backend without a binary; every extraction reports the tool as missing
    pub fn missing() -> Self {
        Self { binary_path: None }
    }

    /// Attempt to find `7z`, `7zz` or `7za` in PATH
    pub fn from_path() -> Option<Self> {
        SEVENZIP_CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(Self::new)
    }

    /// Resolve the binary from configuration
    ///
    /// An explicit `sevenzip_path` wins; otherwise PATH is searched when
    /// `search_path` is set. An unresolved binary is not an error here, it
    /// surfaces as [`ExtractionError::ToolNotFound`] on first use.
    pub fn from_config(tools: &ToolsConfig) -> Self {
        if let Some(path) = &tools.sevenzip_path {
            return Self::new(path.clone());
        }
        if tools.search_path
            && let Some(found) = Self::from_path()
        {
            debug!(binary = ?found.binary_path, "found 7z in PATH");
            return found;
        }
        warn!("7z binary not found, only ZIP archives can be extracted");
        Self::missing()
    }

    /// Resolved binary, if any
    pub fn binary_path(&self) -> Option<&Path> {
        self.binary_path.as_deref()
    }

    fn tool_not_found() -> Error {
        Error::Extraction(ExtractionError::ToolNotFound {
            tool: TOOL_NAME.to_string(),
        })
    }

    fn cleanup(dest_path: &Path) {
        if let Err(e) = remove_dir_force(dest_path) {
            warn!(?dest_path, error = %e, "failed to remove partial output");
        }
    }
}

#[async_trait]
impl ArchiveBackend for SevenZipCli {
    async fn extract(
        &self,
        archive_path: &Path,
        dest_path: &Path,
        password: &str,
    ) -> Result<ExtractionOutcome> {
        let binary = self.binary_path.as_ref().ok_or_else(Self::tool_not_found)?;

        debug!(
            ?archive_path,
            ?dest_path,
            password_length = password.len(),
            "running 7z"
        );

        let mut output_flag = std::ffi::OsString::from("-o");
        output_flag.push(dest_path.as_os_str());

        // `output()` drains stderr while waiting, so a chatty child cannot
        // block on a full pipe
        let output = Command::new(binary)
            .arg("x")
            .arg(format!("-p{password}"))
            .arg(archive_path)
            .arg(output_flag)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            // A binary that cannot be executed is as unusable as a missing one
            Err(e) if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ) =>
            {
                warn!(?binary, error = %e, "cannot execute 7z");
                return Err(Self::tool_not_found());
            }
            Err(e) => {
                Self::cleanup(dest_path);
                warn!(?archive_path, ?binary, error = %e, "failed to execute 7z");
                return Ok(ExtractionOutcome::Failure);
            }
        };

        if output.status.success() {
            return Ok(ExtractionOutcome::Success);
        }

        Self::cleanup(dest_path);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_password_error(&stderr) {
            debug!(?archive_path, "7z rejected the password");
            Ok(ExtractionOutcome::WrongPassword)
        } else {
            warn!(
                ?archive_path,
                code = ?output.status.code(),
                stderr = %stderr.trim(),
                "7z extraction failed"
            );
            Ok(ExtractionOutcome::Failure)
        }
    }

    fn name(&self) -> &'static str {
        "cli-7z"
    }
}
