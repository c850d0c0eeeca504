use crate::console::Notifier;
use crate::error::{Error, ExtractionError};
use crate::types::{ArchiveKind, ArchiveResult, ArchiveTask, Event, ExtractionOutcome};
use crate::utils::remove_dir_force;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::Backends;
use super::password_list::PasswordList;

/// Credential search for one archive
///
/// An existing output location short-circuits to
/// [`ArchiveResult::AlreadyExtracted`] without touching the archive.
/// Otherwise passwords are tried strictly in list order against the backend
/// for the archive's kind, stopping at the first success. Tar archives carry
/// no encryption and are only tried with the empty password.
///
/// Wrong passwords, undecodable names and generic failures advance to the
/// next password; a backend error (missing external program) ends the search
/// at once. On every failed result the output location does not exist.
pub async fn extract_archive(
    task: &ArchiveTask,
    passwords: &PasswordList,
    backends: &Backends,
    notifier: &dyn Notifier,
) -> ArchiveResult {
    let archive_path = task.path.as_path();
    let output = task.output_location();

    if output.exists() {
        debug!(?archive_path, ?output, "output exists, skipping archive");
        notifier.notify(&Event::Skipping {
            archive: task.path.clone(),
            kind: task.kind,
            level: task.level,
        });
        return ArchiveResult::AlreadyExtracted { output };
    }

    notifier.notify(&Event::Extracting {
        archive: task.path.clone(),
        kind: task.kind,
        level: task.level,
    });

    let tar_passwords;
    let passwords = if task.kind == ArchiveKind::Tar {
        tar_passwords = PasswordList::empty_only();
        &tar_passwords
    } else {
        passwords
    };

    let backend = backends.for_kind(task.kind);
    let start = Instant::now();
    let mut saw_wrong_password = false;
    let mut saw_wrong_encoding = false;

    info!(
        ?archive_path,
        kind = %task.kind,
        backend = backend.name(),
        password_count = passwords.len(),
        "attempting extraction with {} password(s)",
        passwords.len()
    );

    for (i, password) in passwords.iter().enumerate() {
        notifier.notify(&Event::TryingPassword {
            level: task.level,
            password: password.clone(),
        });
        debug!(
            attempt = i + 1,
            total = passwords.len(),
            password_length = password.len(),
            "trying password {}/{}",
            i + 1,
            passwords.len()
        );

        match backend.extract(archive_path, &output, password).await {
            Ok(ExtractionOutcome::Success) => {
                let elapsed = start.elapsed();
                info!(
                    ?archive_path,
                    ?output,
                    attempt = i + 1,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "extraction successful on attempt {}/{}",
                    i + 1,
                    passwords.len()
                );
                notifier.notify(&Event::Extracted {
                    archive: task.path.clone(),
                    output: output.clone(),
                    password: password.clone(),
                    elapsed,
                    level: task.level,
                });
                return ArchiveResult::Extracted {
                    output,
                    password: password.clone(),
                    elapsed,
                };
            }
            Ok(ExtractionOutcome::WrongPassword) => {
                debug!(attempt = i + 1, "wrong password, trying next");
                saw_wrong_password = true;
            }
            Ok(ExtractionOutcome::WrongEncoding) => {
                debug!(attempt = i + 1, "no encoding decodes the archive, trying next");
                saw_wrong_encoding = true;
            }
            Ok(ExtractionOutcome::Failure) => {
                debug!(attempt = i + 1, "extraction failed, trying next password");
            }
            Err(e) => {
                warn!(?archive_path, error = %e, "extraction aborted");
                let reason = match e {
                    Error::Extraction(inner) => inner,
                    other => ExtractionError::ExtractionFailed {
                        archive: task.path.clone(),
                        reason: other.to_string(),
                    },
                };
                return fail(task, &output, reason, notifier);
            }
        }
    }

    let reason = if saw_wrong_encoding && !saw_wrong_password {
        ExtractionError::WrongEncoding {
            archive: task.path.clone(),
            encodings: backends.zip_encodings().to_string(),
        }
    } else {
        ExtractionError::AllPasswordsFailed {
            archive: task.path.clone(),
            count: passwords.len(),
        }
    };
    warn!(
        ?archive_path,
        attempted = passwords.len(),
        reason = %reason,
        "no credential succeeded"
    );
    fail(task, &output, reason, notifier)
}

fn fail(
    task: &ArchiveTask,
    output: &std::path::Path,
    reason: ExtractionError,
    notifier: &dyn Notifier,
) -> ArchiveResult {
    if let Err(e) = remove_dir_force(output) {
        warn!(?output, error = %e, "failed to remove output of failed extraction");
    }
    notifier.notify(&Event::Failed {
        archive: task.path.clone(),
        level: task.level,
        reason: reason.clone(),
    });
    ArchiveResult::Failed(reason)
}
