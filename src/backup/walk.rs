//! Exclude-aware directory traversal
//!
//! A single pre-order walker shared by the staging copy and the archive
//! writer, so both honour the same exclusions and the same error policy.
//! Excluded directories are pruned: nothing beneath them is visited.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::exclude::{normalize, ExcludeMatcher};
use crate::error::{BackupError, BackupResult};

/// What to do when an entry cannot be listed or inspected mid-walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TraversalPolicy {
    /// Fail the whole operation (default)
    #[default]
    Abort,
    /// Log a warning and continue without the entry
    Warn,
}

/// Kind of a visited entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
}

/// An entry handed to the visitor
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Absolute (or root-joined) path on disk
    pub path: PathBuf,
    /// Forward-slash path relative to the walk root
    pub relative: String,
    pub kind: EntryKind,
}

/// Counters collected during a walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub dirs: usize,
    pub files: usize,
    pub excluded: usize,
    pub skipped: usize,
}

/// Walks a tree, pruning excluded entries
pub struct Walker<'a> {
    matcher: &'a ExcludeMatcher,
    policy: TraversalPolicy,
}

impl<'a> Walker<'a> {
    pub fn new(matcher: &'a ExcludeMatcher, policy: TraversalPolicy) -> Self {
        Self { matcher, policy }
    }

    /// Visit every non-excluded entry under `root` (the root itself is not visited)
    ///
    /// Failing to list the root is always an error; deeper listing and stat
    /// failures follow the traversal policy. Errors returned by the visitor
    /// always abort.
    pub fn walk<F>(&self, root: &Path, mut visit: F) -> BackupResult<WalkStats>
    where
        F: FnMut(&WalkEntry) -> BackupResult<()>,
    {
        // The walker reports an unreadable root like any other entry error,
        // which the Warn policy would swallow
        fs::read_dir(root).map_err(|e| {
            BackupError::Archive(format!("Failed to read directory {}: {}", root.display(), e))
        })?;

        let excluded = Arc::new(AtomicUsize::new(0));
        let mut builder = ignore::WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b));
        if !self.matcher.is_empty() {
            let matcher = self.matcher.clone();
            let walk_root = root.to_path_buf();
            let counter = Arc::clone(&excluded);
            builder.filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let relative = relative_path(&walk_root, entry.path());
                if matcher.is_excluded_normalized(&relative) {
                    debug!("Excluding: {} (matches pattern)", relative);
                    counter.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
                true
            });
        }

        let mut stats = WalkStats::default();
        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    self.on_error(e.to_string(), &mut stats)?;
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }

            let path = entry.path().to_path_buf();
            let Some(file_type) = entry.file_type() else {
                warn!("Skipping entry without a file type: {}", path.display());
                stats.skipped += 1;
                continue;
            };

            let kind = if file_type.is_dir() {
                EntryKind::Dir
            } else if file_type.is_file() {
                EntryKind::File
            } else if file_type.is_symlink() {
                match fs::metadata(&path) {
                    Ok(meta) if meta.is_file() => EntryKind::File,
                    Ok(_) => {
                        warn!("Skipping symlink to non-file: {}", path.display());
                        stats.skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        self.on_error(format!("{}: {}", path.display(), e), &mut stats)?;
                        continue;
                    }
                }
            } else {
                warn!("Skipping special file: {}", path.display());
                stats.skipped += 1;
                continue;
            };

            let walk_entry = WalkEntry {
                relative: relative_path(root, &path),
                path,
                kind,
            };
            visit(&walk_entry)?;

            match kind {
                EntryKind::Dir => stats.dirs += 1,
                EntryKind::File => stats.files += 1,
            }
        }

        stats.excluded = excluded.load(Ordering::Relaxed);
        Ok(stats)
    }

    fn on_error(&self, detail: String, stats: &mut WalkStats) -> BackupResult<()> {
        match self.policy {
            TraversalPolicy::Abort => {
                Err(BackupError::Archive(format!("Failed to access {}", detail)))
            }
            TraversalPolicy::Warn => {
                warn!("Error accessing path {}. Skipping.", detail);
                stats.skipped += 1;
                Ok(())
            }
        }
    }
}

/// Forward-slash form of `path` relative to `root`
fn relative_path(root: &Path, path: &Path) -> String {
    normalize(path.strip_prefix(root).unwrap_or(path))
}
