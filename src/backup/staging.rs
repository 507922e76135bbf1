//! Temporary staging tree for one archive build
//!
//! Layout:
//!
//! ```text
//! <staging root>/
//!   compose/<project>/...
//!   appdata/<data path basename>/...
//! ```
//!
//! The root is a `tempfile::TempDir`, so it is removed when the tree is
//! dropped, on success, on error and while unwinding from a panic.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{BackupError, BackupResult};

/// Owns the staging directory for one project's backup attempt
pub struct StagingTree {
    dir: TempDir,
    project: String,
    used_names: HashSet<String>,
}

impl StagingTree {
    /// Create a fresh, uniquely named staging root
    ///
    /// `parent` defaults to the system temp directory. It must never be the
    /// backup directory itself.
    pub fn create(project: &str, parent: Option<&Path>) -> BackupResult<Self> {
        let prefix = format!("docker-backup-{}-", project);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| {
            BackupError::Archive(format!("Failed to create temporary backup directory: {}", e))
        })?;

        debug!("Using temporary directory: {}", dir.path().display());

        Ok(Self {
            dir,
            project: project.to_string(),
            used_names: HashSet::new(),
        })
    }

    /// Root of the staging tree
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// `compose/<project>` inside the staging tree
    pub fn compose_dir(&self) -> PathBuf {
        self.root().join("compose").join(&self.project)
    }

    /// `appdata` inside the staging tree
    pub fn appdata_dir(&self) -> PathBuf {
        self.root().join("appdata")
    }

    /// Destination folder for a resolved data path
    ///
    /// The first data path with a given basename gets `appdata/<base>`;
    /// later ones get the basename qualified with a short hash of the full
    /// source path so they never overwrite each other.
    pub fn appdata_target(&mut self, source: &Path) -> PathBuf {
        let base = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "root".to_string());

        let name = if self.used_names.insert(base.clone()) {
            base
        } else {
            let hash = blake3::hash(source.to_string_lossy().as_bytes());
            let qualified = format!("{}-{}", base, &hash.to_hex()[..8]);
            warn!(
                "Appdata basename '{}' is already staged; storing {} as '{}'",
                base,
                source.display(),
                qualified
            );
            self.used_names.insert(qualified.clone());
            qualified
        };

        self.appdata_dir().join(name)
    }

    /// Remove the staging tree now, reporting failures
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Cleaned up temp dir {}", path.display()),
            Err(e) => warn!("Failed to remove temp dir {}: {}", path.display(), e),
        }
    }
}
