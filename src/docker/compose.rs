//! Docker Compose stack control
//!
//! The compose flavour (`docker compose` plugin or standalone
//! `docker-compose`) is detected once at startup and handed to everything
//! that shells out to it.

use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{BackupError, BackupResult};
use crate::tools::locate_executable;

/// Operations the backup pipeline needs from a stack
pub trait StackController {
    /// Stop and remove the stack's containers
    fn stop(&self, dir: &Path) -> BackupResult<()>;

    /// Whether any of the stack's containers are still running
    fn is_running(&self, dir: &Path) -> BackupResult<bool>;

    /// Pull newer images
    fn pull(&self, dir: &Path) -> BackupResult<()>;

    /// Start the stack in the background
    fn start_detached(&self, dir: &Path) -> BackupResult<()>;
}

/// How to invoke Docker Compose
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCommand {
    program: String,
    prefix: Vec<String>,
}

impl ComposeCommand {
    /// `docker compose` (v2 plugin)
    pub fn plugin() -> Self {
        Self::custom("docker", ["compose"])
    }

    /// `docker-compose` (v1 standalone)
    pub fn standalone() -> Self {
        Self::custom("docker-compose", Vec::<String>::new())
    }

    /// Any program plus leading arguments
    pub fn custom<I, S>(program: impl Into<String>, prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            prefix: prefix.into_iter().map(Into::into).collect(),
        }
    }

    /// Pick the working compose flavour, preferring the v2 plugin
    pub fn detect() -> BackupResult<Self> {
        let plugin = Self::plugin();
        if locate_executable(&plugin.program).is_some() && plugin.responds() {
            return Ok(plugin);
        }

        let standalone = Self::standalone();
        if locate_executable(&standalone.program).is_some() {
            return Ok(standalone);
        }

        Err(BackupError::Config(
            "Docker Compose command not found or not working. Please install Docker Compose (v1 or v2)."
                .into(),
        ))
    }

    pub fn is_plugin(&self) -> bool {
        self.program == "docker" && self.prefix.first().map(String::as_str) == Some("compose")
    }

    fn responds(&self) -> bool {
        Command::new(&self.program)
            .args(&self.prefix)
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Run a compose subcommand in `dir`, returning stdout
    ///
    /// Failures are built with `err`, so each caller picks its own error
    /// variant. The message includes the command line, exit status and stderr.
    pub fn run(
        &self,
        dir: &Path,
        args: &[&str],
        err: fn(String) -> BackupError,
    ) -> BackupResult<String> {
        let line = self.command_line(args);
        debug!("Running command in {}: {}", dir.display(), line);

        let output = Command::new(&self.program)
            .args(&self.prefix)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| err(format!("failed to run {} in {}: {}", line, dir.display(), e)))?;

        if !output.status.success() {
            return Err(err(format!(
                "failed to run {} in {}: {}\nStderr: {}",
                line,
                dir.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn command_line(&self, args: &[&str]) -> String {
        let mut parts = vec![self.program.as_str()];
        parts.extend(self.prefix.iter().map(String::as_str));
        parts.extend(args.iter().copied());
        parts.join(" ")
    }
}

impl fmt::Display for ComposeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_line(&[]))
    }
}

/// [`StackController`] backed by the compose CLI
#[derive(Debug, Clone)]
pub struct ComposeStack {
    command: ComposeCommand,
}

impl ComposeStack {
    pub fn new(command: ComposeCommand) -> Self {
        Self { command }
    }

    fn run(&self, dir: &Path, args: &[&str]) -> BackupResult<String> {
        self.command.run(dir, args, BackupError::StackControl)
    }
}

impl StackController for ComposeStack {
    fn stop(&self, dir: &Path) -> BackupResult<()> {
        self.run(dir, &["down"]).map(|_| ())
    }

    fn is_running(&self, dir: &Path) -> BackupResult<bool> {
        let output = self.run(dir, &["ps", "-q"])?;
        debug!("'ps -q' output for {}: {}", dir.display(), output.trim());
        Ok(!output.trim().is_empty())
    }

    fn pull(&self, dir: &Path) -> BackupResult<()> {
        self.run(dir, &["pull"]).map(|_| ())
    }

    fn start_detached(&self, dir: &Path) -> BackupResult<()> {
        self.run(dir, &["up", "-d"]).map(|_| ())
    }
}
