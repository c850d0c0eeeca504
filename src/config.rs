//! Configuration types for nested-extract
//!
//! The configuration is read once from a TOML file, validated, and then passed
//! by reference to every component that needs it. Nothing in the crate keeps
//! process-wide configuration state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locations searched (in order) when no configuration path is given
pub const CONFIG_SEARCH_PATHS: [&str; 2] = ["./config/nested_extract.toml", "./nested_extract.toml"];

/// Encoding that is always tried last for ZIP entry names and passwords
pub const DEFAULT_ZIP_ENCODING: &str = "utf-8";

/// Main configuration for nested-extract
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root directory to scan (default: ".")
    #[serde(default = "default_target_directory")]
    pub target_directory: PathBuf,

    /// Inline passwords, tried before the password file entries
    #[serde(default)]
    pub passwords: Vec<String>,

    /// Password file (grouped format, see [`crate::extraction::PasswordList`])
    #[serde(default)]
    pub password_file: Option<PathBuf>,

    /// Additional encodings for ZIP entry names, tried in order before
    /// [`DEFAULT_ZIP_ENCODING`] (default: gbk, shift_jis)
    #[serde(default = "default_zip_encodings")]
    pub zip_metadata_encodings: Vec<String>,

    /// Traditional ZIP decryption strategy used to pre-screen passwords
    #[serde(default)]
    pub zip_decryption: ZipDecryption,

    /// Exclusion rules applied before content sniffing
    #[serde(default)]
    pub exclude: ExcludeConfig,

    /// Filename remediation rules
    #[serde(default)]
    pub rename: RenameConfig,

    /// External tool configuration
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Log file configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_directory: default_target_directory(),
            passwords: Vec::new(),
            password_file: None,
            zip_metadata_encodings: default_zip_encodings(),
            zip_decryption: ZipDecryption::default(),
            exclude: ExcludeConfig::default(),
            rename: RenameConfig::default(),
            tools: ToolsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Files that are never sniffed or extracted
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExcludeConfig {
    /// File suffixes including the dot (e.g. ".txt"), matched against the last extension
    #[serde(default)]
    pub suffixes: Vec<String>,

    /// Exact file names
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Substrings of the file name
    #[serde(default)]
    pub substrings: Vec<String>,
}

/// Corruption markers and rename behavior
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RenameConfig {
    /// Unwanted substrings injected into file names; sorted longest-first on load
    #[serde(default)]
    pub substrings: Vec<String>,

    /// Rename and retry without asking (default: false)
    #[serde(default)]
    pub auto_rename: bool,
}

/// External tool paths
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the 7z executable (auto-detected if None)
    #[serde(default)]
    pub sevenzip_path: Option<PathBuf>,

    /// Whether to search PATH for 7z if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            sevenzip_path: None,
            search_path: true,
        }
    }
}

/// Logging configuration (consumed by the binary)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level filter directive, e.g. "warn" or "nested_extract=debug" (default: "warn")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (default: "nested-extract.log")
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Traditional PKWARE decryption implementation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZipDecryption {
    /// Bitwise CRC-32, the straightforward reference implementation
    Reference,
    /// Table-driven CRC-32 (default)
    #[default]
    Table,
}

impl Config {
    /// Parse and validate a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()
    }

    /// Load and validate the configuration from `path`, or from the first
    /// existing [`CONFIG_SEARCH_PATHS`] entry when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::read(path)?.validate()
    }

    /// Like [`Config::load`] but without validation, for callers that
    /// override fields first
    pub fn read(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) if p.is_file() => p.to_path_buf(),
            Some(p) => {
                return Err(Error::Config {
                    message: format!("cannot find the config file: {}", p.display()),
                    key: None,
                });
            }
            None => CONFIG_SEARCH_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|p| p.is_file())
                .ok_or_else(|| Error::Config {
                    message: format!(
                        "config file should be found in one of these paths: {:?}, \
                         or you can specify the path with --config",
                        CONFIG_SEARCH_PATHS
                    ),
                    key: None,
                })?,
        };

        debug!(?path, "loading configuration");
        let text = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Validate the configuration and normalize derived fields
    ///
    /// Rename substrings are re-sorted longest-first so that a longer marker
    /// is never left partially stripped by a shorter one matching first.
    pub fn validate(mut self) -> Result<Self> {
        if !self.target_directory.is_dir() {
            return Err(Error::config(
                "target_directory",
                format!(
                    "target directory {} doesn't exist",
                    self.target_directory.display()
                ),
            ));
        }

        if let Some(file) = &self.password_file
            && !file.is_file()
        {
            return Err(Error::config(
                "password_file",
                format!("password file {} doesn't exist", file.display()),
            ));
        }

        for label in &self.zip_metadata_encodings {
            if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
                return Err(Error::config(
                    "zip_metadata_encodings",
                    format!("unknown encoding label: {label}"),
                ));
            }
        }

        if self.rename.substrings.iter().any(|s| s.is_empty()) {
            return Err(Error::config(
                "rename.substrings",
                "unwanted substrings must not be empty",
            ));
        }

        sort_longest_first(&mut self.rename.substrings);
        self.rename.substrings.dedup();

        Ok(self)
    }
}

/// Sort by descending character count, ties in descending lexicographic order
pub(crate) fn sort_longest_first(substrings: &mut [String]) {
    substrings.sort_by(|a, b| {
        b.chars()
            .count()
            .cmp(&a.chars().count())
            .then_with(|| b.cmp(a))
    });
}

// Default value functions
fn default_target_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_zip_encodings() -> Vec<String> {
    vec!["gbk".into(), "shift_jis".into()]
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".into()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("nested-extract.log")
}
