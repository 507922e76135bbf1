//! Project discovery
//!
//! A project is an immediate subdirectory of the compose root that directly
//! contains a `.yml` or `.yaml` file. Directories without one are not
//! projects and are skipped silently.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{BackupError, BackupResult};

/// Extensions recognised as stack definition files
pub const DEFINITION_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// One discovered compose stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    /// Directory basename; archive stem and log tag
    pub name: String,
    /// Absolute path of the stack's working directory
    pub definition_dir: PathBuf,
    /// First definition file in the directory, by name
    pub definition_file: PathBuf,
}

/// Find all projects under `root`, ordered by directory name
///
/// An empty result is not an error; the caller decides what that means.
pub fn discover(root: &Path) -> BackupResult<Vec<Project>> {
    let read_err = |e: std::io::Error| {
        BackupError::Discovery(format!(
            "Failed to read compose directory '{}': {}",
            root.display(),
            e
        ))
    };

    let root = root.canonicalize().map_err(read_err)?;
    let mut dirs = Vec::new();
    for entry in fs::read_dir(&root).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            dirs.push(entry);
        }
    }
    dirs.sort_by_key(|e| e.file_name());

    let mut projects = Vec::new();
    for entry in dirs {
        let dir = entry.path();
        match find_definition_file(&dir) {
            Ok(Some(definition_file)) => projects.push(Project {
                name: entry.file_name().to_string_lossy().to_string(),
                definition_dir: dir,
                definition_file,
            }),
            Ok(None) => debug!("No compose file in {}, skipping", dir.display()),
            Err(e) => warn!("{}. Skipping directory.", e),
        }
    }

    if projects.is_empty() {
        debug!("No projects with compose files found directly in {}", root.display());
    }

    Ok(projects)
}

/// First file in `dir` (by name, non-recursive) with a definition extension
pub fn find_definition_file(dir: &Path) -> BackupResult<Option<PathBuf>> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| {
        BackupError::Discovery(format!(
            "Failed to read project directory '{}': {}",
            dir.display(),
            e
        ))
    })? {
        let Ok(entry) = entry else { continue };
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
            continue;
        }
        let path = entry.path();
        let recognised = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| DEFINITION_EXTENSIONS.contains(&ext));
        if recognised {
            candidates.push(path);
        }
    }

    candidates.sort();
    Ok(candidates.into_iter().next())
}
