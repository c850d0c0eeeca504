//! Recursive traversal controller
//!
//! Walks the target directory, extracts every archive it finds and descends
//! into each fresh output directory. A per-run visited set guarantees that a
//! path is attempted at most once, even when remediation re-walks a
//! directory; failures with corrupted-looking sibling names are batched for
//! the remediation workflow at the end of each walk.

use crate::config::{Config, sort_longest_first};
use crate::console::{Notifier, Prompt, auto_prompt};
use crate::error::Result;
use crate::extraction::{Backends, PasswordList, detect_archive_kind, extract_archive};
use crate::filter::ExclusionRules;
use crate::remediation::{Remediator, has_flagged_files};
use crate::types::{ArchiveResult, ArchiveTask};
use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Counters for one run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraversalSummary {
    /// Archives extracted during this run
    pub extracted: usize,
    /// Archives skipped because their output already existed
    pub skipped: usize,
    /// Archives for which no credential succeeded
    pub failed: usize,
}

/// Traversal controller for one run
///
/// # Examples
///
/// ```no_run
/// use nested_extract::{Config, Extractor};
/// use nested_extract::console::{TerminalNotifier, stdin_prompt};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> nested_extract::Result<()> {
/// let config = Arc::new(Config::load(None)?);
/// let mut extractor =
///     Extractor::new(config, Arc::new(TerminalNotifier::stdout()), stdin_prompt()).await?;
/// let summary = extractor.run().await?;
/// println!("{} extracted", summary.extracted);
/// # Ok(())
/// # }
/// ```
pub struct Extractor {
    config: Arc<Config>,
    backends: Backends,
    rules: ExclusionRules,
    passwords: PasswordList,
    notifier: Arc<dyn Notifier>,
    prompt: Prompt,
    /// Rename markers, longest first
    unwanted: Vec<String>,
    visited: HashSet<PathBuf>,
    /// Visited archives whose latest attempt failed
    failed: HashSet<PathBuf>,
    summary: TraversalSummary,
}

impl Extractor {
    /// Build the production extractor: real backends, passwords from the configuration
    ///
    /// In auto-rename mode `prompt` is replaced by one that always agrees.
    pub async fn new(
        config: Arc<Config>,
        notifier: Arc<dyn Notifier>,
        prompt: Prompt,
    ) -> Result<Self> {
        let backends = Backends::from_config(&config)?;
        let passwords =
            PasswordList::collect(&config.passwords, config.password_file.as_deref()).await;
        Self::with_backends(config, backends, passwords, notifier, prompt)
    }

    /// Build an extractor around explicit backends and passwords
    ///
    /// The configuration does not need to be validated; rename markers are
    /// ordered longest-first here as well.
    pub fn with_backends(
        config: Arc<Config>,
        backends: Backends,
        passwords: PasswordList,
        notifier: Arc<dyn Notifier>,
        prompt: Prompt,
    ) -> Result<Self> {
        let rules = ExclusionRules::new(&config.exclude)?;
        let prompt = if config.rename.auto_rename {
            auto_prompt()
        } else {
            prompt
        };
        let mut unwanted = config.rename.substrings.clone();
        sort_longest_first(&mut unwanted);
        unwanted.dedup();

        Ok(Self {
            config,
            backends,
            rules,
            passwords,
            notifier,
            prompt,
            unwanted,
            visited: HashSet::new(),
            failed: HashSet::new(),
            summary: TraversalSummary::default(),
        })
    }

    /// Traverse the configured target directory at depth 0
    pub async fn run(&mut self) -> Result<TraversalSummary> {
        let root = self.config.target_directory.clone();
        info!(?root, "starting traversal");
        self.walk(&root, 0).await?;
        info!(
            extracted = self.summary.extracted,
            skipped = self.summary.skipped,
            failed = self.summary.failed,
            "traversal finished"
        );
        Ok(self.summary)
    }

    /// Paths attempted so far in this run
    pub fn visited(&self) -> &HashSet<PathBuf> {
        &self.visited
    }

    /// Counters accumulated so far in this run
    pub fn summary(&self) -> TraversalSummary {
        self.summary
    }

    /// Process every candidate file under `root`, then remediate the batch
    ///
    /// At depth 0 only the immediate children of `root` are considered; below
    /// that the whole subtree is. Only errors listing `root` itself propagate.
    pub fn walk<'a>(
        &'a mut self,
        root: &'a Path,
        level: u32,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let files = list_files(root, level)?;
            debug!(?root, level, count = files.len(), "walking directory");

            let mut candidates = BTreeSet::new();

            for file in files {
                if self.rules.is_excluded(&file) {
                    debug!(?file, "excluded");
                    continue;
                }
                if !self.visited.insert(file.clone()) {
                    continue;
                }

                let kind = match detect_archive_kind(&file) {
                    Ok(Some(kind)) => kind,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(?file, error = %e, "cannot read file for classification");
                        continue;
                    }
                };

                let task = ArchiveTask::new(file.clone(), kind, level);
                let result = extract_archive(
                    &task,
                    &self.passwords,
                    &self.backends,
                    self.notifier.as_ref(),
                )
                .await;

                match &result {
                    ArchiveResult::Extracted { .. } => self.summary.extracted += 1,
                    ArchiveResult::AlreadyExtracted { .. } => self.summary.skipped += 1,
                    ArchiveResult::Failed(_) => self.summary.failed += 1,
                }
                if matches!(result, ArchiveResult::Failed(_)) {
                    self.failed.insert(file.clone());
                } else {
                    self.failed.remove(&file);
                }

                if let Some(output) = result.output() {
                    let output = output.to_path_buf();
                    if let Err(e) = self.walk(&output, level + 1).await {
                        warn!(?output, error = %e, "failed to traverse extracted output");
                    }
                } else if let Some(parent) = file.parent()
                    && has_flagged_files(parent, &self.unwanted)
                {
                    candidates.insert(parent.to_path_buf());
                }
            }

            if !candidates.is_empty() {
                self.remediate(candidates, level).await;
            }
            Ok(())
        })
    }

    async fn remediate(&mut self, candidates: BTreeSet<PathBuf>, level: u32) {
        let outcome = Remediator::new(
            &self.unwanted,
            self.config.rename.auto_rename,
            &self.prompt,
            self.notifier.as_ref(),
        )
        .run(&candidates);

        if !outcome.retry {
            return;
        }

        // Renamed files get new paths; failed archives in those directories
        // are forgotten so they can be attempted again, extracted ones stay
        for dir in &outcome.renamed_dirs {
            let retry: Vec<PathBuf> = self
                .failed
                .iter()
                .filter(|p| p.parent() == Some(dir.as_path()))
                .cloned()
                .collect();
            for path in retry {
                self.visited.remove(&path);
                self.failed.remove(&path);
            }
        }

        for dir in &candidates {
            info!(?dir, level, "retrying extraction after renaming");
            if let Err(e) = self.walk(dir, level).await {
                warn!(?dir, error = %e, "retry traversal failed");
            }
        }
    }
}

/// Regular files to consider, sorted by path
fn list_files(root: &Path, level: u32) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if level == 0 {
        for entry in std::fs::read_dir(root)? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
    } else {
        for entry in WalkDir::new(root).min_depth(1) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => warn!(?root, error = %e, "skipping unreadable entry"),
            }
        }
    }

    files.sort();
    Ok(files)
}
