//! Settings for stack-backup
//!
//! Settings come from four layers, highest precedence first: command-line
//! flags, `DOCKER_BACKUP_*` environment variables, the YAML config file, and
//! built-in defaults. The file is optional; the flag and environment layers
//! are collected by the CLI into a [`SettingsOverrides`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backup::{ExcludeMatcher, TraversalPolicy};
use crate::error::{BackupError, BackupResult};
use crate::logging::LogRotation;

/// Off-host transfer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsyncSettings {
    /// Whether archives are shipped after creation
    #[serde(default)]
    pub enabled: bool,

    /// Destination, e.g. `user@host:/backups/`
    #[serde(default)]
    pub destination: String,

    /// Option string, tokenized shell-style
    #[serde(default = "default_rsync_options")]
    pub options: String,

    /// Transfer executable name or path
    #[serde(default = "default_rsync_command")]
    pub command: String,
}

impl Default for RsyncSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            destination: String::new(),
            options: default_rsync_options(),
            command: default_rsync_command(),
        }
    }
}

impl RsyncSettings {
    /// Enabled and pointed somewhere
    pub fn is_active(&self) -> bool {
        self.enabled && !self.destination.trim().is_empty()
    }
}

/// Settings for one backup run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory whose subfolders are compose projects
    #[serde(default = "default_compose_dir")]
    pub compose_dir: PathBuf,

    /// Root under which bind mounts count as appdata
    #[serde(default = "default_appdata_dir")]
    pub appdata_dir: PathBuf,

    /// Where archives are written
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Start stacks again once their backup succeeded
    #[serde(default)]
    pub restart_after_backup: bool,

    /// Pull images before restarting
    #[serde(default)]
    pub pull_before_restart: bool,

    /// Glob patterns left out of copies and archives
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    #[serde(default)]
    pub verbose: bool,

    /// Log every action instead of performing it
    #[serde(default)]
    pub dry_run: bool,

    /// Log file path; empty disables file logging
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    /// Size in megabytes at which the log file is rotated
    #[serde(default = "default_log_rotation_max_size_mb")]
    pub log_rotation_max_size_mb: u64,

    /// Rotated log files kept; 0 keeps all
    #[serde(default = "default_log_rotation_max_backups")]
    pub log_rotation_max_backups: usize,

    /// Age in days after which rotated log files are removed; 0 keeps them
    #[serde(default = "default_log_rotation_max_age_days")]
    pub log_rotation_max_age_days: u64,

    #[serde(default)]
    pub log_rotation_compress: bool,

    /// What to do with unreadable entries while walking trees
    #[serde(default)]
    pub traversal_errors: TraversalPolicy,

    #[serde(default)]
    pub rsync: RsyncSettings,
}

fn default_compose_dir() -> PathBuf {
    PathBuf::from("/home/server/compose")
}

fn default_appdata_dir() -> PathBuf {
    PathBuf::from("/home/server/appdata")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("./docker_backups")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("backup-tool.log")
}

fn default_log_rotation_max_size_mb() -> u64 {
    LogRotation::default().max_size_mb
}

fn default_log_rotation_max_backups() -> usize {
    LogRotation::default().max_backups
}

fn default_log_rotation_max_age_days() -> u64 {
    LogRotation::default().max_age_days
}

fn default_rsync_options() -> String {
    "--archive --partial --compress --delete".to_string()
}

fn default_rsync_command() -> String {
    "rsync".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            compose_dir: default_compose_dir(),
            appdata_dir: default_appdata_dir(),
            backup_dir: default_backup_dir(),
            restart_after_backup: false,
            pull_before_restart: false,
            exclude_patterns: Vec::new(),
            verbose: false,
            dry_run: false,
            log_file: default_log_file(),
            log_rotation_max_size_mb: default_log_rotation_max_size_mb(),
            log_rotation_max_backups: default_log_rotation_max_backups(),
            log_rotation_max_age_days: default_log_rotation_max_age_days(),
            log_rotation_compress: false,
            traversal_errors: TraversalPolicy::default(),
            rsync: RsyncSettings::default(),
        }
    }
}

/// Values from the flag and environment layers; `None` means "not given"
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub compose_dir: Option<PathBuf>,
    pub appdata_dir: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub restart_after_backup: Option<bool>,
    pub pull_before_restart: Option<bool>,
    pub exclude_patterns: Option<Vec<String>>,
    pub verbose: Option<bool>,
    pub dry_run: Option<bool>,
    pub log_file: Option<PathBuf>,
    pub log_rotation_max_size_mb: Option<u64>,
    pub log_rotation_max_backups: Option<usize>,
    pub log_rotation_max_age_days: Option<u64>,
    pub log_rotation_compress: Option<bool>,
    pub traversal_errors: Option<TraversalPolicy>,
    pub rsync_enabled: Option<bool>,
    pub rsync_destination: Option<String>,
    pub rsync_options: Option<String>,
    pub rsync_command: Option<String>,
}

impl Settings {
    /// Load settings from a YAML file
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> BackupResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            BackupError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&contents).map(Some).map_err(|e| match e {
            BackupError::Config(msg) => {
                BackupError::Config(format!("{} (in '{}')", msg, path.display()))
            }
            other => other,
        })
    }

    /// Load settings from disk, or fall back to defaults if the file doesn't exist
    pub fn load_or_default(path: &Path) -> BackupResult<Self> {
        Ok(Self::load(path)?.unwrap_or_default())
    }

    /// Parse settings from YAML text
    pub fn from_yaml(contents: &str) -> BackupResult<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
            .map_err(|e| BackupError::Config(format!("Failed to parse settings: {}", e)))
    }

    /// Render the effective settings as YAML
    pub fn to_yaml(&self) -> BackupResult<String> {
        serde_yaml::to_string(self)
            .map_err(|e| BackupError::Config(format!("Failed to serialize settings: {}", e)))
    }

    /// Apply the flag/environment layer on top of these settings
    pub fn apply(&mut self, overrides: SettingsOverrides) {
        if let Some(v) = overrides.compose_dir {
            self.compose_dir = v;
        }
        if let Some(v) = overrides.appdata_dir {
            self.appdata_dir = v;
        }
        if let Some(v) = overrides.backup_dir {
            self.backup_dir = v;
        }
        if let Some(v) = overrides.restart_after_backup {
            self.restart_after_backup = v;
        }
        if let Some(v) = overrides.pull_before_restart {
            self.pull_before_restart = v;
        }
        if let Some(v) = overrides.exclude_patterns {
            self.exclude_patterns = v;
        }
        if let Some(v) = overrides.verbose {
            self.verbose = v;
        }
        if let Some(v) = overrides.dry_run {
            self.dry_run = v;
        }
        if let Some(v) = overrides.log_file {
            self.log_file = v;
        }
        if let Some(v) = overrides.log_rotation_max_size_mb {
            self.log_rotation_max_size_mb = v;
        }
        if let Some(v) = overrides.log_rotation_max_backups {
            self.log_rotation_max_backups = v;
        }
        if let Some(v) = overrides.log_rotation_max_age_days {
            self.log_rotation_max_age_days = v;
        }
        if let Some(v) = overrides.log_rotation_compress {
            self.log_rotation_compress = v;
        }
        if let Some(v) = overrides.traversal_errors {
            self.traversal_errors = v;
        }
        if let Some(v) = overrides.rsync_enabled {
            self.rsync.enabled = v;
        }
        if let Some(v) = overrides.rsync_destination {
            self.rsync.destination = v;
        }
        if let Some(v) = overrides.rsync_options {
            self.rsync.options = v;
        }
        if let Some(v) = overrides.rsync_command {
            self.rsync.command = v;
        }
    }

    /// Check the settings before any project is touched
    pub fn validate(&self) -> BackupResult<()> {
        for (name, dir) in [
            ("compose_dir", &self.compose_dir),
            ("appdata_dir", &self.appdata_dir),
            ("backup_dir", &self.backup_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(BackupError::Config(format!("{} must not be empty", name)));
            }
        }

        if self.log_rotation_max_size_mb == 0 {
            return Err(BackupError::Config(
                "log_rotation_max_size_mb must be at least 1".into(),
            ));
        }

        if self.rsync.enabled && self.rsync.command.trim().is_empty() {
            return Err(BackupError::Config(
                "rsync.command must not be empty when rsync is enabled".into(),
            ));
        }

        ExcludeMatcher::new(&self.exclude_patterns)
            .map_err(|e| BackupError::Config(e.to_string()))?;

        Ok(())
    }

    /// Whether file logging is enabled
    pub fn log_file(&self) -> Option<&Path> {
        if self.log_file.as_os_str().is_empty() {
            None
        } else {
            Some(&self.log_file)
        }
    }

    /// Rotation policy for the log file
    pub fn log_rotation(&self) -> LogRotation {
        LogRotation {
            max_size_mb: self.log_rotation_max_size_mb,
            max_backups: self.log_rotation_max_backups,
            max_age_days: self.log_rotation_max_age_days,
            compress: self.log_rotation_compress,
        }
    }
}
