//! CLI command handlers
//!
//! This module contains the clap definitions shared by every subcommand and
//! the handlers that bridge them to discovery and the backup runner.

use std::path::{Path, PathBuf};

use clap::builder::BoolishValueParser;
use clap::{Args, Subcommand};
use tracing::{info, warn};

use crate::backup::{BackupRunner, RunSummary, TraversalPolicy};
use crate::config::{Settings, SettingsOverrides};
use crate::discovery::{discover, Project};
use crate::display::{format_project_list, format_run_summary};
use crate::docker::{ComposeCommand, ComposeStack, ComposeVolumes};
use crate::error::{BackupError, BackupResult};
use crate::tools::locate_executable;
use crate::transfer::RsyncTransfer;

/// Top-level subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Back up every discovered project (default)
    Run,

    /// List discovered projects without touching them
    List,

    /// Show the effective configuration
    Config,
}

/// Options accepted by every subcommand
///
/// Boolean flags take an optional value (`--dry-run`, `--dry-run=false`) so
/// that a flag can switch off something the config file switched on.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Path to the YAML config file
    #[arg(
        long,
        global = true,
        env = "DOCKER_BACKUP_CONFIG_FILE",
        default_value = "config.yaml"
    )]
    pub config: PathBuf,

    /// Directory containing one folder per compose project
    #[arg(long, global = true, env = "DOCKER_BACKUP_COMPOSE_DIR")]
    pub compose_dir: Option<PathBuf>,

    /// Root directory of bind-mounted application data
    #[arg(long, global = true, env = "DOCKER_BACKUP_APPDATA_DIR")]
    pub appdata_dir: Option<PathBuf>,

    /// Where archives are written
    #[arg(long, global = true, env = "DOCKER_BACKUP_BACKUP_DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Start stacks again after a successful backup
    #[arg(
        long,
        global = true,
        env = "DOCKER_BACKUP_RESTART_AFTER_BACKUP",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub restart_after_backup: Option<bool>,

    /// Pull images before restarting
    #[arg(
        long,
        global = true,
        env = "DOCKER_BACKUP_PULL_BEFORE_RESTART",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub pull_before_restart: Option<bool>,

    /// Exclude pattern (repeatable)
    #[arg(
        long = "exclude",
        global = true,
        env = "DOCKER_BACKUP_EXCLUDE",
        value_delimiter = ','
    )]
    pub exclude: Option<Vec<String>>,

    /// Enable debug logging
    #[arg(
        short,
        long,
        global = true,
        env = "DOCKER_BACKUP_VERBOSE",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub verbose: Option<bool>,

    /// Log what would happen without doing it
    #[arg(
        long,
        global = true,
        env = "DOCKER_BACKUP_DRY_RUN",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub dry_run: Option<bool>,

    /// Log file path (empty disables file logging)
    #[arg(long, global = true, env = "DOCKER_BACKUP_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Rotate the log file once it reaches this many megabytes
    #[arg(long, global = true, env = "DOCKER_BACKUP_LOG_ROTATION_MAX_SIZE_MB")]
    pub log_rotation_max_size_mb: Option<u64>,

    /// Rotated log files to keep (0 keeps all)
    #[arg(long, global = true, env = "DOCKER_BACKUP_LOG_ROTATION_MAX_BACKUPS")]
    pub log_rotation_max_backups: Option<usize>,

    /// Remove rotated log files older than this many days (0 keeps them)
    #[arg(long, global = true, env = "DOCKER_BACKUP_LOG_ROTATION_MAX_AGE_DAYS")]
    pub log_rotation_max_age_days: Option<u64>,

    /// Gzip rotated log files
    #[arg(
        long,
        global = true,
        env = "DOCKER_BACKUP_LOG_ROTATION_COMPRESS",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub log_rotation_compress: Option<bool>,

    /// How to treat unreadable entries while copying and archiving
    #[arg(long, global = true, env = "DOCKER_BACKUP_TRAVERSAL_ERRORS", value_enum)]
    pub traversal_errors: Option<TraversalPolicy>,

    /// Ship archives with rsync after creation
    #[arg(
        long,
        global = true,
        env = "DOCKER_BACKUP_RSYNC_ENABLED",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub rsync_enabled: Option<bool>,

    /// rsync destination, e.g. user@host:/backups/
    #[arg(long, global = true, env = "DOCKER_BACKUP_RSYNC_DESTINATION")]
    pub rsync_destination: Option<String>,

    /// rsync option string
    #[arg(
        long,
        global = true,
        env = "DOCKER_BACKUP_RSYNC_OPTIONS",
        allow_hyphen_values = true
    )]
    pub rsync_options: Option<String>,

    /// rsync executable
    #[arg(long, global = true, env = "DOCKER_BACKUP_RSYNC_COMMAND")]
    pub rsync_command: Option<String>,
}

impl GlobalOptions {
    /// The flag and environment layer
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            compose_dir: self.compose_dir.clone(),
            appdata_dir: self.appdata_dir.clone(),
            backup_dir: self.backup_dir.clone(),
            restart_after_backup: self.restart_after_backup,
            pull_before_restart: self.pull_before_restart,
            exclude_patterns: self.exclude.as_ref().map(|patterns| {
                patterns
                    .iter()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            }),
            verbose: self.verbose,
            dry_run: self.dry_run,
            log_file: self.log_file.clone(),
            log_rotation_max_size_mb: self.log_rotation_max_size_mb,
            log_rotation_max_backups: self.log_rotation_max_backups,
            log_rotation_max_age_days: self.log_rotation_max_age_days,
            log_rotation_compress: self.log_rotation_compress,
            traversal_errors: self.traversal_errors,
            rsync_enabled: self.rsync_enabled,
            rsync_destination: self.rsync_destination.clone(),
            rsync_options: self.rsync_options.clone(),
            rsync_command: self.rsync_command.clone(),
        }
    }

    /// Load the config file and layer flags and environment on top
    pub fn resolve_settings(&self) -> BackupResult<Settings> {
        let mut settings = Settings::load_or_default(&self.config)?;
        settings.apply(self.overrides());
        settings.validate()?;
        Ok(settings)
    }
}

/// Discover projects, treating an empty result as fatal
pub fn discover_projects(settings: &Settings) -> BackupResult<Vec<Project>> {
    let projects = discover(&settings.compose_dir)?;
    if projects.is_empty() {
        return Err(BackupError::Discovery(format!(
            "No projects with compose files found in '{}'",
            settings.compose_dir.display()
        )));
    }
    Ok(projects)
}

/// Resolve the compose flavour; in a dry run a missing compose is tolerated
pub fn detect_compose(dry_run: bool) -> BackupResult<ComposeCommand> {
    match ComposeCommand::detect() {
        Ok(command) => {
            info!("Using compose command: {}", command);
            Ok(command)
        }
        Err(e) if dry_run => {
            let fallback = ComposeCommand::plugin();
            warn!("{}. Dry run continues assuming '{}'.", e, fallback);
            Ok(fallback)
        }
        Err(e) => Err(e),
    }
}

/// Make sure the transfer command exists before any stack is stopped
pub fn check_transfer_command(settings: &Settings) -> BackupResult<()> {
    if !settings.rsync.enabled {
        return Ok(());
    }
    match locate_executable(&settings.rsync.command) {
        Some(path) => {
            info!("Using transfer command: {}", path.display());
            Ok(())
        }
        None => Err(BackupError::Config(format!(
            "rsync is enabled but command '{}' was not found",
            settings.rsync.command
        ))),
    }
}

/// Handle `run`
pub fn handle_run(settings: &Settings) -> BackupResult<RunSummary> {
    info!("Starting backup run");
    info!("Compose directory: {}", settings.compose_dir.display());
    info!("Appdata directory: {}", settings.appdata_dir.display());
    info!("Backup directory: {}", settings.backup_dir.display());
    if !settings.exclude_patterns.is_empty() {
        info!("Exclude patterns: {}", settings.exclude_patterns.join(", "));
    }
    if settings.dry_run {
        warn!("*** DRY RUN MODE ENABLED *** No changes will be made");
    }

    let compose = detect_compose(settings.dry_run)?;
    check_transfer_command(settings)?;

    let projects = discover_projects(settings)?;
    info!("Found {} projects to process", projects.len());

    let stack = ComposeStack::new(compose.clone());
    let volumes = ComposeVolumes::new(compose);
    let transfer = RsyncTransfer::new(settings.rsync.command.clone());

    let summary = BackupRunner::new(settings, &stack, &volumes, &transfer).run(&projects);
    print!("{}", format_run_summary(&summary));
    Ok(summary)
}

/// Handle `list`
pub fn handle_list(settings: &Settings) -> BackupResult<()> {
    let projects = discover(&settings.compose_dir)?;
    print!("{}", format_project_list(&projects));
    if projects.is_empty() {
        println!();
    }
    Ok(())
}

/// Handle `config`
pub fn handle_config(settings: &Settings, config_path: &Path) -> BackupResult<()> {
    let source = if config_path.exists() {
        config_path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", config_path.display())
    };
    println!("# Config file: {}", source);
    print!("{}", settings.to_yaml()?);
    Ok(())
}
