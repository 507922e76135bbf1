//! stack-backup - backups for a fleet of Docker Compose stacks
//!
//! For every project under the compose directory the tool stops the stack,
//! archives its compose directory and bind-mounted appdata into a dated zip,
//! optionally ships the archive with rsync, and optionally restarts the stack.
//! Projects are processed one at a time and a failure in one never blocks the
//! rest.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Layered settings (flags, environment, YAML file, defaults)
//! - `error`: Custom error types
//! - `discovery`: Finding compose projects
//! - `backup`: Exclude rules, staging, archiving and the per-project pipeline
//! - `docker`: Compose stack control and bind-mount resolution
//! - `transfer`: Off-host copies of finished archives
//! - `logging`: Console and file log setup
//! - `cli`, `display`: Command handlers and terminal output
//!
//! # Example
//!
//! ```rust,ignore
//! use stack_backup::backup::BackupRunner;
//! use stack_backup::config::Settings;
//! use stack_backup::discovery::discover;
//! use stack_backup::docker::{ComposeCommand, ComposeStack, ComposeVolumes};
//! use stack_backup::transfer::RsyncTransfer;
//!
//! let settings = Settings::load_or_default("config.yaml".as_ref())?;
//! let compose = ComposeCommand::detect()?;
//! let stack = ComposeStack::new(compose.clone());
//! let volumes = ComposeVolumes::new(compose);
//! let transfer = RsyncTransfer::new(&settings.rsync.command);
//!
//! let projects = discover(&settings.compose_dir)?;
//! let summary = BackupRunner::new(&settings, &stack, &volumes, &transfer).run(&projects);
//! std::process::exit(summary.exit_code().into());
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod display;
pub mod docker;
pub mod error;
pub mod logging;
pub mod tools;
pub mod transfer;

pub use error::{BackupError, BackupResult};
