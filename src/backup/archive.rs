//! Archive builder
//!
//! Stages a project's compose directory and its appdata paths into a
//! temporary tree, then writes that tree into a single deflate-compressed
//! zip named `<project>_<YYYYMMDD>.zip` in the backup directory.
//!
//! The zip is written next to its final path as `*.zip.tmp` and renamed into
//! place only once it is complete, so a failed build never leaves a partial
//! archive behind.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::exclude::ExcludeMatcher;
use super::staging::StagingTree;
use super::walk::{EntryKind, TraversalPolicy, Walker};
use crate::error::{BackupError, BackupResult};

/// Entries at or above this size need zip64 headers
const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

/// Builds one archive per project
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    backup_dir: PathBuf,
    exclude_patterns: Vec<String>,
    policy: TraversalPolicy,
    staging_parent: Option<PathBuf>,
}

impl ArchiveBuilder {
    /// Create a builder writing into `backup_dir`
    pub fn new(backup_dir: impl Into<PathBuf>, exclude_patterns: Vec<String>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            exclude_patterns,
            policy: TraversalPolicy::default(),
            staging_parent: None,
        }
    }

    /// Set the policy for unreadable entries during both walks
    pub fn with_policy(mut self, policy: TraversalPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Create staging trees under `parent` instead of the system temp dir
    pub fn with_staging_parent(mut self, parent: impl Into<PathBuf>) -> Self {
        self.staging_parent = Some(parent.into());
        self
    }

    /// Get backup directory path
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude_patterns
    }

    /// Final archive path for a project on a given day
    pub fn archive_path(&self, project: &str, date: NaiveDate) -> PathBuf {
        self.backup_dir.join(archive_file_name(project, date))
    }

    /// Build today's archive for a project
    ///
    /// Returns the path to the created archive. A second build on the same
    /// day replaces the first.
    pub fn build(
        &self,
        project: &str,
        definition_dir: &Path,
        data_paths: &[PathBuf],
    ) -> BackupResult<PathBuf> {
        self.build_dated(project, definition_dir, data_paths, Local::now().date_naive())
    }

    /// Build the archive for a project, stamping it with `date`
    pub fn build_dated(
        &self,
        project: &str,
        definition_dir: &Path,
        data_paths: &[PathBuf],
        date: NaiveDate,
    ) -> BackupResult<PathBuf> {
        let matcher = ExcludeMatcher::new(&self.exclude_patterns)?;
        let walker = Walker::new(&matcher, self.policy);

        let mut staging = StagingTree::create(project, self.staging_parent.as_deref())?;
        let result = self
            .stage(&mut staging, &walker, definition_dir, data_paths)
            .and_then(|()| {
                fs::create_dir_all(&self.backup_dir).map_err(|e| {
                    BackupError::Archive(format!(
                        "Failed to create backup directory '{}': {}",
                        self.backup_dir.display(),
                        e
                    ))
                })?;
                let target = self.archive_path(project, date);
                info!("Creating zip archive: {}", target.display());
                write_archive(staging.root(), &target, &walker)?;
                Ok(target)
            });
        staging.close();

        result
    }

    fn stage(
        &self,
        staging: &mut StagingTree,
        walker: &Walker<'_>,
        definition_dir: &Path,
        data_paths: &[PathBuf],
    ) -> BackupResult<()> {
        info!("Copying compose directory '{}'...", definition_dir.display());
        copy_tree(definition_dir, &staging.compose_dir(), walker).map_err(|e| {
            BackupError::Archive(format!("Failed to copy compose directory contents: {}", e))
        })?;

        if data_paths.is_empty() {
            return Ok(());
        }

        info!("Copying appdata directories...");
        fs::create_dir_all(staging.appdata_dir()).map_err(|e| {
            BackupError::Archive(format!("Failed to create temp appdata structure: {}", e))
        })?;

        for source in data_paths {
            let target = staging.appdata_target(source);
            info!("  - Copying '{}' to '{}'", source.display(), target.display());
            copy_path(source, &target, walker).map_err(|e| {
                BackupError::Archive(format!(
                    "Failed to copy appdata path '{}': {}",
                    source.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }
}

/// `<project>_<YYYYMMDD>.zip`
pub fn archive_file_name(project: &str, date: NaiveDate) -> String {
    format!("{}_{}.zip", project, date.format("%Y%m%d"))
}

/// Copy a data path that may be a single file or a directory
fn copy_path(source: &Path, target: &Path, walker: &Walker<'_>) -> BackupResult<()> {
    let meta = fs::metadata(source)?;
    if meta.is_dir() {
        copy_tree(source, target, walker)
    } else {
        copy_file(source, target)
    }
}

/// Copy the contents of `source` into `target`, honouring exclusions
fn copy_tree(source: &Path, target: &Path, walker: &Walker<'_>) -> BackupResult<()> {
    fs::create_dir_all(target)?;

    let stats = walker.walk(source, |entry| {
        let dest = target.join(&entry.relative);
        match entry.kind {
            EntryKind::Dir => fs::create_dir_all(&dest).map_err(|e| {
                BackupError::Archive(format!(
                    "Failed to create directory '{}': {}",
                    dest.display(),
                    e
                ))
            }),
            EntryKind::File => copy_file(&entry.path, &dest),
        }
    })?;

    debug!(
        "Copied {} files and {} directories from {} ({} excluded)",
        stats.files,
        stats.dirs,
        source.display(),
        stats.excluded
    );
    Ok(())
}

/// Copy one file, then try to carry its permission bits over
fn copy_file(source: &Path, dest: &Path) -> BackupResult<()> {
    let fail = |e: io::Error| {
        BackupError::Archive(format!(
            "Failed to copy file '{}' to '{}': {}",
            source.display(),
            dest.display(),
            e
        ))
    };

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(fail)?;
    }

    let mut reader = File::open(source).map_err(fail)?;
    let permissions = reader.metadata().map_err(fail)?.permissions();
    let mut writer = File::create(dest).map_err(fail)?;
    io::copy(&mut reader, &mut writer).map_err(fail)?;
    drop(writer);

    if let Err(e) = fs::set_permissions(dest, permissions) {
        warn!("Failed to set permissions on '{}': {}", dest.display(), e);
    }

    Ok(())
}

/// Write the staging tree into `target`, atomically
fn write_archive(staging_root: &Path, target: &Path, walker: &Walker<'_>) -> BackupResult<()> {
    let temp_path = target.with_extension("zip.tmp");

    if let Err(e) = write_zip(staging_root, &temp_path, walker) {
        let _ = fs::remove_file(&temp_path);
        return Err(BackupError::Archive(format!(
            "Failed during zip creation: {}",
            e
        )));
    }

    fs::rename(&temp_path, target).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        BackupError::Archive(format!("Failed to move archive into place: {}", e))
    })
}

fn write_zip(root: &Path, path: &Path, walker: &Walker<'_>) -> BackupResult<()> {
    let file = File::create(path).map_err(|e| {
        BackupError::Archive(format!(
            "Failed to create zip file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let mut zip = ZipWriter::new(BufWriter::new(file));
    let base = FileOptions::default().compression_method(CompressionMethod::Deflated);

    walker.walk(root, |entry| {
        let meta = fs::metadata(&entry.path)?;
        let options = base.unix_permissions(unix_mode(&meta));
        debug!("Adding path: {}", entry.relative);

        match entry.kind {
            EntryKind::Dir => zip.add_directory(entry.relative.as_str(), options)?,
            EntryKind::File => {
                let options = options.large_file(meta.len() >= ZIP64_THRESHOLD);
                zip.start_file(entry.relative.as_str(), options)?;
                let mut source = File::open(&entry.path)?;
                io::copy(&mut source, &mut zip)?;
            }
        }
        Ok(())
    })?;

    let mut writer = zip.finish()?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

#[cfg(unix)]
fn unix_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn unix_mode(meta: &fs::Metadata) -> u32 {
    if meta.is_dir() {
        0o755
    } else if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
