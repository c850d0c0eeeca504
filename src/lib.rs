//! # nested-extract
//!
//! Recursive extractor for nested, password-protected archives.
//!
//! ## How it works
//!
//! - Files are classified by content sniffing, never by extension, into
//!   tar, ZIP, 7z or RAR.
//! - Each archive is extracted to `<archive>_out` by searching an ordered
//!   password list (and, for ZIP, an ordered list of file name encodings).
//!   ZIP uses the `zip` library; everything else runs the external `7z`
//!   program.
//! - Every fresh output directory is scanned again, so archives inside
//!   archives unpack automatically. An existing output directory marks its
//!   archive as done, which makes runs idempotent.
//! - When extraction fails next to files whose names carry known corruption
//!   markers, the names can be repaired and extraction retried.
//!
//! ## Quick Start
//!
//! ```no_run
//! use nested_extract::{Config, Extractor};
//! use nested_extract::console::{TerminalNotifier, stdin_prompt};
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_toml_str(r#"
//!         target_directory = "/data/incoming"
//!         passwords = ["secret"]
//!     "#)?;
//!
//!     let mut extractor = Extractor::new(
//!         Arc::new(config),
//!         Arc::new(TerminalNotifier::stdout()),
//!         stdin_prompt(),
//!     )
//!     .await?;
//!     extractor.run().await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Progress events sink and interactive prompts
pub mod console;
/// Error types
pub mod error;
/// Archive classification and extraction
pub mod extraction;
/// File exclusion rules
pub mod filter;
/// Filename remediation
pub mod remediation;
/// Recursive traversal controller
pub mod traversal;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;


// Re-export commonly used types
pub use config::Config;
pub use error::{Error, ExtractionError, Result};
pub use extraction::{ArchiveBackend, Backends, PasswordList};
pub use traversal::{Extractor, TraversalSummary};
pub use types::{ArchiveKind, ArchiveResult, ArchiveTask, Event, ExtractionOutcome};
