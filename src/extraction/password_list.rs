use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Ordered password list for archive extraction
///
/// Passwords are tried strictly in this order:
/// 1. Empty password (always first, most archives are unprotected)
/// 2. Inline passwords from the configuration
/// 3. Password file entries (grouped format, see [`PasswordList::parse_grouped`])
///
/// Duplicates are dropped, keeping the first occurrence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordList {
    passwords: Vec<String>,
}

impl PasswordList {
    /// Build a list from already-loaded passwords, with the empty password prepended
    pub fn new<I, S>(passwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut list = vec![String::new()];
        seen.insert(String::new());

        for pw in passwords {
            let pw = pw.into();
            if seen.insert(pw.clone()) {
                list.push(pw);
            }
        }

        Self { passwords: list }
    }

    /// List containing only the empty password
    pub fn empty_only() -> Self {
        Self::new(std::iter::empty::<String>())
    }

    /// Collect passwords from the configuration and optional password file
    ///
    /// A password file that cannot be read is logged and skipped; the inline
    /// passwords are still used.
    pub async fn collect(inline: &[String], password_file: Option<&Path>) -> Self {
        let mut all: Vec<String> = inline.to_vec();

        if let Some(path) = password_file {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => all.extend(Self::parse_grouped(&content)),
                Err(e) => warn!(?path, error = %e, "failed to read password file"),
            }
        }

        let list = Self::new(all);
        debug!(
            "collected {} unique passwords for extraction",
            list.passwords.len()
        );
        list
    }

    /// Parse the grouped password file format
    ///
    /// Lines are trimmed. Blank lines separate groups; the groups are returned
    /// last group first, lines inside a group in file order. This lets users
    /// append their newest passwords at the bottom of the file and have them
    /// tried first. A file without blank separators is a plain ordered list.
    pub fn parse_grouped(content: &str) -> Vec<String> {
        let mut groups: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<String> = Vec::new();

        for line in content.lines().map(str::trim) {
            if line.is_empty() {
                if !current.is_empty() {
                    groups.push(std::mem::take(&mut current));
                }
            } else {
                current.push(line.to_string());
            }
        }
        if !current.is_empty() {
            groups.push(current);
        }

        groups.into_iter().rev().flatten().collect()
    }

    /// Get an iterator over passwords
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.passwords.iter()
    }

    /// Check if there are any passwords to try (never true, the empty password is always present)
    pub fn is_empty(&self) -> bool {
        self.passwords.is_empty()
    }

    /// Get the number of passwords
    pub fn len(&self) -> usize {
        self.passwords.len()
    }
}
