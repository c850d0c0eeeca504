//! Filename remediation: strip corruption markers from file names and retry
//!
//! Upstream distributors inject marker substrings (e.g. `删除`) into archive
//! file names so that naive tools fail on them. When an archive fails, its
//! directory is checked for such names; the whole batch of flagged
//! directories is then offered for renaming once per traversal pass.

use crate::console::{Notifier, Prompt};
use crate::error::ExtractionError;
use crate::types::{Event, RenameCandidate};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Remove every occurrence of every substring, in the given order
///
/// `substrings` is expected longest-first (see [`crate::config::Config::validate`])
/// so a longer marker is never left partially stripped by a shorter one.
pub fn strip_unwanted(name: &str, substrings: &[String]) -> String {
    substrings
        .iter()
        .fold(name.to_string(), |acc, s| acc.replace(s.as_str(), ""))
}

/// Names of the regular files directly inside `dir` containing any substring, sorted
pub fn flagged_files(dir: &Path, substrings: &[String]) -> io::Result<Vec<String>> {
    if substrings.is_empty() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if substrings.iter().any(|s| name.contains(s.as_str())) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// `true` when `dir` directly holds at least one flagged file
///
/// An unreadable directory is treated as not flagged.
pub fn has_flagged_files(dir: &Path, substrings: &[String]) -> bool {
    match flagged_files(dir, substrings) {
        Ok(names) => !names.is_empty(),
        Err(e) => {
            debug!(?dir, error = %e, "cannot inspect directory for rename candidates");
            false
        }
    }
}

/// What a remediation batch did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemediationOutcome {
    /// Directories in which at least one file was renamed
    pub renamed_dirs: Vec<PathBuf>,
    /// Whether extraction should be retried in the candidate directories
    pub retry: bool,
}

/// Rename-and-retry workflow over a batch of candidate directories
pub struct Remediator<'a> {
    substrings: &'a [String],
    auto_rename: bool,
    prompt: &'a Prompt,
    notifier: &'a dyn Notifier,
}

impl<'a> Remediator<'a> {
    /// Create a remediator
    ///
    /// In `auto_rename` mode the findings are not presented; the caller is
    /// expected to pass an always-yes prompt.
    pub fn new(
        substrings: &'a [String],
        auto_rename: bool,
        prompt: &'a Prompt,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            substrings,
            auto_rename,
            prompt,
            notifier,
        }
    }

    /// Process the batch
    ///
    /// A declined proposal or a failed rename only affects that one file.
    /// The retry question is asked even when the overview is declined.
    pub fn run(&self, dirs: &BTreeSet<PathBuf>) -> RemediationOutcome {
        let candidates: Vec<RenameCandidate> = dirs
            .iter()
            .filter_map(|dir| match flagged_files(dir, self.substrings) {
                Ok(files) if !files.is_empty() => Some(RenameCandidate {
                    dir: dir.clone(),
                    files,
                }),
                Ok(_) => None,
                Err(e) => {
                    warn!(?dir, error = %e, "cannot list rename candidates");
                    None
                }
            })
            .collect();

        if candidates.is_empty() {
            return RemediationOutcome::default();
        }

        let review = if self.auto_rename {
            true
        } else {
            self.notifier.notify(&Event::RenameCandidates {
                candidates: candidates.clone(),
            });
            (self.prompt)("Take a look?")
        };

        let mut renamed_dirs = Vec::new();
        if review {
            for candidate in &candidates {
                if self.rename_in_dir(candidate) > 0 {
                    renamed_dirs.push(candidate.dir.clone());
                }
            }
        } else {
            debug!("rename candidates declined");
        }

        let retry = (self.prompt)("Do you want to retry extracting?");
        if retry {
            self.notifier.notify(&Event::Retrying {
                dirs: candidates.iter().map(|c| c.dir.clone()).collect(),
            });
        }

        RemediationOutcome {
            renamed_dirs,
            retry,
        }
    }

    /// Rename the flagged files of one directory, returning how many were renamed
    fn rename_in_dir(&self, candidate: &RenameCandidate) -> usize {
        let mut renamed = 0;
        for name in &candidate.files {
            let from = candidate.dir.join(name);
            let new_name = strip_unwanted(name, self.substrings);
            let to = candidate.dir.join(&new_name);

            let question = format!(
                "Do you want to rename {} to {}?",
                from.display(),
                to.display()
            );
            if !(self.prompt)(&question) {
                self.notifier.notify(&Event::RenameSkipped { path: from });
                continue;
            }

            match rename_no_clobber(&from, &to, &new_name) {
                Ok(()) => {
                    info!(?from, ?to, "renamed file");
                    self.notifier.notify(&Event::Renamed { from, to });
                    renamed += 1;
                }
                Err(reason) => {
                    warn!(?from, ?to, %reason, "rename failed");
                    self.notifier.notify(&Event::RenameFailed {
                        error: ExtractionError::RenameFailed {
                            source_path: from,
                            dest_path: to,
                            reason,
                        },
                    });
                }
            }
        }
        renamed
    }
}

/// Rename unless the new name is empty or already taken
fn rename_no_clobber(from: &Path, to: &Path, new_name: &str) -> Result<(), String> {
    if new_name.is_empty() {
        return Err("the name consists only of unwanted substrings".to_string());
    }
    if fs::symlink_metadata(to).is_ok() {
        return Err("destination already exists".to_string());
    }
    fs::rename(from, to).map_err(|e| e.to_string())
}
