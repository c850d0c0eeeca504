use crate::config::ZipDecryption;
use crate::error::{Error, ExtractionError};
use crate::extraction::*;
use crate::test_helpers::{MockBackend, RecordingNotifier, mock_backends};
use crate::types::{ArchiveKind, ArchiveResult, ArchiveTask, Event, ExtractionOutcome};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a valid ZIP archive containing multiple files
fn create_zip_archive_multi(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        std::io::Write::write_all(&mut writer, content).unwrap();
    }
    writer.finish().unwrap();
}

/// Create a password-encrypted ZIP using the deprecated ZipCrypto method
/// (only encryption method supported for writing by zip 0.6)
fn create_encrypted_zip(archive_path: &Path, file_name: &str, content: &[u8], password: &[u8]) {
    use ::zip::unstable::write::FileOptionsExt;
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options = ::zip::write::FileOptions::default()
        .compression_method(::zip::CompressionMethod::Deflated)
        .with_deprecated_encryption(password);
    writer.start_file(file_name, options).unwrap();
    std::io::Write::write_all(&mut writer, content).unwrap();
    writer.finish().unwrap();
}

/// Replace every occurrence of `from` in the file with `to` (same length)
fn patch_bytes(path: &Path, from: &[u8], to: &[u8]) {
    assert_eq!(from.len(), to.len());
    let mut data = std::fs::read(path).unwrap();
    let mut hits = 0;
    let mut i = 0;
    while i + from.len() <= data.len() {
        if &data[i..i + from.len()] == from {
            data[i..i + from.len()].copy_from_slice(to);
            hits += 1;
            i += from.len();
        } else {
            i += 1;
        }
    }
    assert!(hits > 0, "pattern not found");
    std::fs::write(path, data).unwrap();
}

/// Write a single-entry ZIP whose stored name is the raw (non-UTF-8) `raw_name`
fn create_zip_with_raw_name(archive_path: &Path, raw_name: &[u8], content: &[u8]) {
    let placeholder = "@".repeat(raw_name.len());
    create_zip_archive_multi(archive_path, &[(&placeholder, content)]);
    patch_bytes(archive_path, placeholder.as_bytes(), raw_name);
}

/// Set the compression method of every entry (local and central headers)
fn patch_compression_method(archive_path: &Path, method: u16) {
    let mut data = std::fs::read(archive_path).unwrap();
    for i in 0..data.len().saturating_sub(12) {
        if data[i..].starts_with(b"PK\x03\x04") {
            data[i + 8..i + 10].copy_from_slice(&method.to_le_bytes());
        } else if data[i..].starts_with(b"PK\x01\x02") {
            data[i + 10..i + 12].copy_from_slice(&method.to_le_bytes());
        }
    }
    std::fs::write(archive_path, data).unwrap();
}

fn zip_backend(fallback: Arc<MockBackend>) -> ZipBackend {
    ZipBackend::new(
        &["gbk".to_string(), "shift_jis".to_string()],
        zipcrypto::strategy_for(ZipDecryption::Table),
        fallback,
    )
    .unwrap()
}

/// Real ZIP backend plus a mock for the external kinds
fn real_zip_backends(external: Arc<MockBackend>) -> Backends {
    let zip = zip_backend(external.clone());
    let encodings = zip.encoding_names();
    Backends::new(Arc::new(zip), external, encodings)
}

fn tried_passwords(notifier: &RecordingNotifier) -> Vec<String> {
    notifier
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Event::TryingPassword { password, .. } => Some(password),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// PasswordList
// ---------------------------------------------------------------------------

#[test]
fn test_password_list_empty_password_always_first() {
    let list = PasswordList::new(["one", "", "two"]);
    let passwords: Vec<&String> = list.iter().collect();
    assert_eq!(passwords, vec!["", "one", "two"]);
}

#[test]
fn test_password_list_deduplication_keeps_first() {
    let list = PasswordList::new(["b", "a", "b", "c", "a"]);
    let passwords: Vec<&String> = list.iter().collect();
    assert_eq!(passwords, vec!["", "b", "a", "c"]);
    assert_eq!(list.len(), 4);
    assert!(!list.is_empty());
}

#[test]
fn test_password_list_empty_only() {
    let list = PasswordList::empty_only();
    assert_eq!(list.len(), 1);
    assert_eq!(list.iter().next().map(String::as_str), Some(""));
}

#[test]
fn test_parse_grouped_reverses_groups() {
    let content = "\n\nfoo\nfoo2\n\n\nok\nok2\n\n\n\nbar\nbar2\n\n";
    assert_eq!(
        PasswordList::parse_grouped(content),
        vec!["bar", "bar2", "ok", "ok2", "foo", "foo2"]
    );
}

#[test]
fn test_parse_grouped_plain_list_and_trimming() {
    let content = "  first \nsecond\r\n\tthird\n";
    assert_eq!(
        PasswordList::parse_grouped(content),
        vec!["first", "second", "third"]
    );
    assert!(PasswordList::parse_grouped("\n  \n\n").is_empty());
}

#[tokio::test]
async fn test_password_list_collect_inline_before_file() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("passwords.txt");
    std::fs::write(&file, "old\n\nnew\ninline\n").unwrap();

    let list = PasswordList::collect(&["inline".to_string()], Some(&file)).await;
    let passwords: Vec<&String> = list.iter().collect();
    assert_eq!(passwords, vec!["", "inline", "new", "old"]);
}

#[tokio::test]
async fn test_password_list_collect_missing_file_keeps_inline() {
    let list = PasswordList::collect(
        &["only".to_string()],
        Some(Path::new("/nonexistent/passwords.txt")),
    )
    .await;
    let passwords: Vec<&String> = list.iter().collect();
    assert_eq!(passwords, vec!["", "only"]);
}

// ---------------------------------------------------------------------------
// Backend dispatch
// ---------------------------------------------------------------------------

#[test]
fn test_dispatch_routes_kinds_to_backends() {
    let backends = mock_backends(
        MockBackend::always(ExtractionOutcome::Success),
        MockBackend::always(ExtractionOutcome::Failure),
    );
    assert_eq!(backends.for_kind(ArchiveKind::Zip).name(), "mock");
    for kind in [ArchiveKind::Tar, ArchiveKind::SevenZip, ArchiveKind::Rar] {
        assert_eq!(backends.for_kind(kind).name(), "mock");
    }

    let config = crate::config::Config::default();
    let real = Backends::from_config(&config).unwrap();
    assert_eq!(real.for_kind(ArchiveKind::Zip).name(), "zip-library");
    assert_eq!(real.for_kind(ArchiveKind::Rar).name(), "cli-7z");
    assert_eq!(real.zip_encodings(), "GBK, Shift_JIS, UTF-8");
}

// ---------------------------------------------------------------------------
// Extraction controller (mock backends)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unprotected_archive_takes_one_backend_call() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("plain.7z");
    let external = MockBackend::accepting("");
    let backends = mock_backends(MockBackend::always(ExtractionOutcome::Failure), external.clone());
    let notifier = RecordingNotifier::default();

    let result = extract_archive(
        &ArchiveTask::new(&archive, ArchiveKind::SevenZip, 0),
        &PasswordList::new(["a", "b", "c"]),
        &backends,
        &notifier,
    )
    .await;

    assert!(matches!(result, ArchiveResult::Extracted { ref password, .. } if password.is_empty()));
    assert_eq!(external.calls().len(), 1);
}

#[tokio::test]
async fn test_search_stops_at_first_matching_password() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("locked.rar");
    let external = MockBackend::accepting("two");
    let backends = mock_backends(MockBackend::always(ExtractionOutcome::Failure), external.clone());
    let notifier = RecordingNotifier::default();

    let result = extract_archive(
        &ArchiveTask::new(&archive, ArchiveKind::Rar, 2),
        &PasswordList::new(["one", "two", "three"]),
        &backends,
        &notifier,
    )
    .await;

    match result {
        ArchiveResult::Extracted {
            output, password, ..
        } => {
            assert_eq!(password, "two");
            assert_eq!(output, temp.path().join("locked.rar_out"));
        }
        other => panic!("expected Extracted, got {other:?}"),
    }
    assert_eq!(external.passwords_tried(), vec!["", "one", "two"]);
    assert_eq!(tried_passwords(&notifier), vec!["", "one", "two"]);
    assert!(notifier.events().iter().any(|e| matches!(
        e,
        Event::Extracted { level: 2, password, .. } if password == "two"
    )));
}

#[tokio::test]
async fn test_existing_output_is_skipped_without_backend_calls() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("done.zip");
    std::fs::create_dir(temp.path().join("done.zip_out")).unwrap();
    let zip = MockBackend::accepting("");
    let backends = mock_backends(zip.clone(), MockBackend::accepting(""));
    let notifier = RecordingNotifier::default();

    let result = extract_archive(
        &ArchiveTask::new(&archive, ArchiveKind::Zip, 0),
        &PasswordList::empty_only(),
        &backends,
        &notifier,
    )
    .await;

    assert_eq!(
        result,
        ArchiveResult::AlreadyExtracted {
            output: temp.path().join("done.zip_out")
        }
    );
    assert!(zip.calls().is_empty());
    assert!(matches!(notifier.events()[0], Event::Skipping { .. }));
}

#[tokio::test]
async fn test_failed_search_leaves_no_output_behind() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("broken.7z");
    // A misbehaving backend that leaves partial output on failure
    let external = MockBackend::with(|_, dest, _| {
        std::fs::create_dir_all(dest)?;
        std::fs::write(dest.join("partial.bin"), b"half")?;
        Ok(ExtractionOutcome::Failure)
    });
    let backends = mock_backends(MockBackend::always(ExtractionOutcome::Failure), external.clone());
    let notifier = RecordingNotifier::default();

    let result = extract_archive(
        &ArchiveTask::new(&archive, ArchiveKind::SevenZip, 0),
        &PasswordList::new(["x", "y"]),
        &backends,
        &notifier,
    )
    .await;

    assert_eq!(
        result,
        ArchiveResult::Failed(ExtractionError::AllPasswordsFailed {
            archive: archive.clone(),
            count: 3
        })
    );
    // Generic failures still advance to the next password
    assert_eq!(external.calls().len(), 3);
    assert!(!temp.path().join("broken.7z_out").exists());
}

#[tokio::test]
async fn test_missing_tool_aborts_the_password_loop() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("a.7z");
    let external = MockBackend::with(|_, _, _| {
        Err(Error::Extraction(ExtractionError::ToolNotFound {
            tool: "7z".to_string(),
        }))
    });
    let backends = mock_backends(MockBackend::always(ExtractionOutcome::Failure), external.clone());
    let notifier = RecordingNotifier::default();

    let result = extract_archive(
        &ArchiveTask::new(&archive, ArchiveKind::SevenZip, 0),
        &PasswordList::new(["a", "b", "c"]),
        &backends,
        &notifier,
    )
    .await;

    assert_eq!(
        result,
        ArchiveResult::Failed(ExtractionError::ToolNotFound {
            tool: "7z".to_string()
        })
    );
    assert_eq!(external.calls().len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unexecutable_7z_aborts_after_first_password() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let binary = temp.path().join("7z");
    std::fs::write(&binary, b"#!/bin/sh\nexit 0\n").unwrap();
    std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o644)).unwrap();
    let archive = temp.path().join("a.7z");
    std::fs::write(&archive, b"7z\xBC\xAF\x27\x1C\x00\x04").unwrap();

    let backends = Backends::new(
        MockBackend::always(ExtractionOutcome::Failure),
        Arc::new(SevenZipCli::new(binary)),
        "UTF-8",
    );
    let notifier = RecordingNotifier::default();

    let result = extract_archive(
        &ArchiveTask::new(&archive, ArchiveKind::SevenZip, 0),
        &PasswordList::new(["a", "b"]),
        &backends,
        &notifier,
    )
    .await;

    assert_eq!(
        result,
        ArchiveResult::Failed(ExtractionError::ToolNotFound {
            tool: "7z".to_string()
        })
    );
    assert_eq!(tried_passwords(&notifier), vec![""]);
    assert!(!temp.path().join("a.7z_out").exists());
}

#[tokio::test]
async fn test_wrong_encoding_only_is_reported_as_encoding_problem() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("names.zip");
    let zip = MockBackend::always(ExtractionOutcome::WrongEncoding);
    let backends = mock_backends(zip.clone(), MockBackend::accepting(""));
    let notifier = RecordingNotifier::default();

    let result = extract_archive(
        &ArchiveTask::new(&archive, ArchiveKind::Zip, 0),
        &PasswordList::new(["p"]),
        &backends,
        &notifier,
    )
    .await;

    assert_eq!(
        result,
        ArchiveResult::Failed(ExtractionError::WrongEncoding {
            archive,
            encodings: "gbk, shift_jis, UTF-8".to_string()
        })
    );
    assert_eq!(zip.calls().len(), 2);
}

#[tokio::test]
async fn test_wrong_password_outranks_wrong_encoding() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("mixed.zip");
    let zip = MockBackend::with(|_, _, pw| {
        Ok(if pw.is_empty() {
            ExtractionOutcome::WrongPassword
        } else {
            ExtractionOutcome::WrongEncoding
        })
    });
    let backends = mock_backends(zip, MockBackend::accepting(""));
    let notifier = RecordingNotifier::default();

    let result = extract_archive(
        &ArchiveTask::new(&archive, ArchiveKind::Zip, 0),
        &PasswordList::new(["p"]),
        &backends,
        &notifier,
    )
    .await;

    assert!(matches!(
        result,
        ArchiveResult::Failed(ExtractionError::AllPasswordsFailed { count: 2, .. })
    ));
}

#[tokio::test]
async fn test_tar_is_tried_with_empty_password_only() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("bundle.tar");
    let external = MockBackend::always(ExtractionOutcome::Failure);
    let backends = mock_backends(MockBackend::always(ExtractionOutcome::Failure), external.clone());
    let notifier = RecordingNotifier::default();

    let result = extract_archive(
        &ArchiveTask::new(&archive, ArchiveKind::Tar, 0),
        &PasswordList::new(["a", "b"]),
        &backends,
        &notifier,
    )
    .await;

    assert!(matches!(
        result,
        ArchiveResult::Failed(ExtractionError::AllPasswordsFailed { count: 1, .. })
    ));
    assert_eq!(external.passwords_tried(), vec![""]);
}

// ---------------------------------------------------------------------------
// ZIP library backend (real archives)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_password_protected_zip_matches_third_credential() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("a.zip");
    create_encrypted_zip(&archive, "secret.txt", b"the treasure", b"secret");
    let external = MockBackend::always(ExtractionOutcome::Failure);
    let backends = real_zip_backends(external.clone());
    let notifier = RecordingNotifier::default();

    let result = extract_archive(
        &ArchiveTask::new(&archive, ArchiveKind::Zip, 0),
        &PasswordList::new(["", "wrong", "secret"]),
        &backends,
        &notifier,
    )
    .await;

    match result {
        ArchiveResult::Extracted { password, .. } => assert_eq!(password, "secret"),
        other => panic!("expected Extracted, got {other:?}"),
    }
    assert_eq!(tried_passwords(&notifier), vec!["", "wrong", "secret"]);
    let out = temp.path().join("a.zip_out");
    assert_eq!(
        std::fs::read(out.join("secret.txt")).unwrap(),
        b"the treasure"
    );
    assert!(external.calls().is_empty());
    assert!(
        notifier
            .events()
            .iter()
            .any(|e| matches!(e, Event::Extracted { .. }))
    );
}

#[tokio::test]
async fn test_zip_wrong_password_cleans_output() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("locked.zip");
    create_encrypted_zip(&archive, "data.bin", &[7u8; 4096], b"right");
    let backend = zip_backend(MockBackend::always(ExtractionOutcome::Failure));
    let out = temp.path().join("locked.zip_out");

    assert_eq!(
        backend.extract(&archive, &out, "").await.unwrap(),
        ExtractionOutcome::WrongPassword
    );
    assert_eq!(
        backend.extract(&archive, &out, "nope").await.unwrap(),
        ExtractionOutcome::WrongPassword
    );
    assert!(!out.exists());

    assert_eq!(
        backend.extract(&archive, &out, "right").await.unwrap(),
        ExtractionOutcome::Success
    );
    assert_eq!(std::fs::read(out.join("data.bin")).unwrap(), vec![7u8; 4096]);
}

#[tokio::test]
async fn test_zip_nested_directories_are_created() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("tree.zip");
    create_zip_archive_multi(
        &archive,
        &[("top.txt", b"top"), ("dir/sub/deep.txt", b"deep")],
    );
    let backend = zip_backend(MockBackend::always(ExtractionOutcome::Failure));
    let out = temp.path().join("tree.zip_out");

    assert_eq!(
        backend.extract(&archive, &out, "").await.unwrap(),
        ExtractionOutcome::Success
    );
    assert_eq!(std::fs::read(out.join("top.txt")).unwrap(), b"top");
    assert_eq!(std::fs::read(out.join("dir/sub/deep.txt")).unwrap(), b"deep");
}

#[tokio::test]
async fn test_zip_gbk_names_are_decoded() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("cn.zip");
    // "中文.txt" in GBK
    create_zip_with_raw_name(
        &archive,
        &[0xD6, 0xD0, 0xCE, 0xC4, b'.', b't', b'x', b't'],
        b"hello",
    );
    let backend = zip_backend(MockBackend::always(ExtractionOutcome::Failure));
    let out = temp.path().join("cn.zip_out");

    assert_eq!(
        backend.extract(&archive, &out, "").await.unwrap(),
        ExtractionOutcome::Success
    );
    assert_eq!(std::fs::read(out.join("中文.txt")).unwrap(), b"hello");
}

#[tokio::test]
async fn test_zip_undecodable_names_are_wrong_encoding() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("garbled.zip");
    create_zip_with_raw_name(&archive, &[0xFF, 0xFF, b'.', b'b', b'i', b'n'], b"x");
    let backends = real_zip_backends(MockBackend::always(ExtractionOutcome::Failure));
    let notifier = RecordingNotifier::default();

    let result = extract_archive(
        &ArchiveTask::new(&archive, ArchiveKind::Zip, 0),
        &PasswordList::new(["p"]),
        &backends,
        &notifier,
    )
    .await;

    assert_eq!(
        result,
        ArchiveResult::Failed(ExtractionError::WrongEncoding {
            archive: archive.clone(),
            encodings: "GBK, Shift_JIS, UTF-8".to_string()
        })
    );
    assert!(!temp.path().join("garbled.zip_out").exists());
}

#[tokio::test]
async fn test_zip_unsupported_method_falls_back_to_external() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("exotic.zip");
    create_zip_archive_multi(&archive, &[("a.txt", b"aaaa")]);
    patch_compression_method(&archive, 0x4242);
    let fallback = MockBackend::accepting("");
    let backend = zip_backend(fallback.clone());
    let out = temp.path().join("exotic.zip_out");

    assert_eq!(
        backend.extract(&archive, &out, "").await.unwrap(),
        ExtractionOutcome::Success
    );
    assert_eq!(fallback.calls(), vec![(archive.clone(), String::new())]);
}

#[tokio::test]
async fn test_zip_corrupt_archive_is_failure() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("broken.zip");
    std::fs::write(&archive, b"PK\x03\x04 definitely not a zip").unwrap();
    let fallback = MockBackend::accepting("");
    let backend = zip_backend(fallback.clone());
    let out = temp.path().join("broken.zip_out");

    assert_eq!(
        backend.extract(&archive, &out, "").await.unwrap(),
        ExtractionOutcome::Failure
    );
    assert!(!out.exists());
    assert!(fallback.calls().is_empty());
}

#[test]
fn test_unknown_encoding_label_is_rejected() {
    let result = ZipBackend::new(
        &["klingon".to_string()],
        zipcrypto::strategy_for(ZipDecryption::Reference),
        MockBackend::always(ExtractionOutcome::Failure),
    );
    assert!(matches!(result, Err(Error::Config { .. })));
}

#[test]
fn test_default_encoding_is_not_duplicated() {
    let backend = ZipBackend::new(
        &["utf-8".to_string(), "gbk".to_string()],
        zipcrypto::strategy_for(ZipDecryption::Table),
        MockBackend::always(ExtractionOutcome::Failure),
    )
    .unwrap();
    assert_eq!(backend.encoding_names(), "UTF-8, GBK");
}
