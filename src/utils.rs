//! Utility functions for output locations and forced directory removal

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix appended to an archive path to form its output directory
pub const OUTPUT_SUFFIX: &str = "_out";

/// Get the output directory for an archive
///
/// The mapping is deterministic: `P` maps to `P` + [`OUTPUT_SUFFIX`]. The
/// directory's existence doubles as the "already extracted" checkpoint.
///
/// # Examples
///
/// ```
/// use nested_extract::utils::output_location;
/// use std::path::{Path, PathBuf};
///
/// assert_eq!(
///     output_location(Path::new("/data/movie.part1.rar")),
///     PathBuf::from("/data/movie.part1.rar_out")
/// );
/// ```
pub fn output_location(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(OUTPUT_SUFFIX);
    PathBuf::from(name)
}

/// Remove a directory tree, clearing read-only attributes first
///
/// Extracted archives frequently carry read-only files (and on Unix,
/// non-writable directories) that make a plain `remove_dir_all` fail. Every
/// entry is made writable before the tree is deleted. A missing directory is
/// not an error.
pub fn remove_dir_force(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    }

    make_tree_writable(path)?;
    fs::remove_dir_all(path)?;
    debug!(?path, "removed directory tree");
    Ok(())
}

/// Recursively grant the owner write access, never following symlinks
fn make_tree_writable(dir: &Path) -> io::Result<()> {
    make_writable(dir)?;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            make_tree_writable(&path)?;
        } else {
            make_writable(&path)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn make_writable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let meta = fs::metadata(path)?;
    let mut perms = meta.permissions();
    // Directories also need read+exec to be listed and entered
    let wanted = if meta.is_dir() { 0o700 } else { 0o200 };
    if perms.mode() & wanted != wanted {
        perms.set_mode(perms.mode() | wanted);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
#[allow(clippy::permissions_set_readonly_false)]
fn make_writable(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    if perms.readonly() {
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}
