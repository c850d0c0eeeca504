//! File exclusion rules applied before content sniffing

use crate::config::ExcludeConfig;
use crate::error::{Error, Result};
use regex::Regex;
use std::path::Path;

/// Second and later volumes of a multi-volume RAR set
///
/// Matches `name.part2.rar`, `name.part02.rar`, `name.part10.rar`, ... and the
/// old-style `name.r00`, `name.r01`, ... continuation volumes. The first
/// volume (`name.part1.rar`, `name.rar`) pulls the rest in on its own.
pub const RAR_CONTINUATION_PATTERN: &str = r"(?i)(\.part0*([2-9]|[1-9]\d+)\.rar|\.r\d{2,3})$";

/// Compiled exclusion rules
#[derive(Clone, Debug)]
pub struct ExclusionRules {
    suffixes: Vec<String>,
    filenames: Vec<String>,
    substrings: Vec<String>,
    rar_continuation: Regex,
}

impl ExclusionRules {
    /// Compile the rules from configuration
    pub fn new(config: &ExcludeConfig) -> Result<Self> {
        let rar_continuation = Regex::new(RAR_CONTINUATION_PATTERN)
            .map_err(|e| Error::Other(format!("invalid volume pattern: {}", e)))?;

        Ok(Self {
            suffixes: config.suffixes.clone(),
            filenames: config.filenames.clone(),
            substrings: config.substrings.clone(),
            rar_continuation,
        })
    }

    /// `true` if the file must never be classified or opened
    ///
    /// Suffixes compare against the last extension including its dot, so
    /// `.txt` excludes `notes.txt` but not `notes.txt.zip`.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };

        let suffix = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()));
        if let Some(suffix) = &suffix
            && self.suffixes.iter().any(|s| s == suffix)
        {
            return true;
        }

        self.filenames.iter().any(|f| *f == name)
            || self.substrings.iter().any(|s| name.contains(s.as_str()))
            || self.rar_continuation.is_match(&name)
    }
}
