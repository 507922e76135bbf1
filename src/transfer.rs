//! Off-host archive transfer

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{BackupError, BackupResult};

/// Copies a finished archive somewhere else
pub trait Transfer {
    fn send(&self, local: &Path, destination: &str, options: &str) -> BackupResult<()>;
}

/// [`Transfer`] via an rsync-compatible command
#[derive(Debug, Clone)]
pub struct RsyncTransfer {
    command: String,
}

impl RsyncTransfer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Transfer for RsyncTransfer {
    fn send(&self, local: &Path, destination: &str, options: &str) -> BackupResult<()> {
        let args = tokenize_options(options)?;
        debug!(
            "Running {} {} {} {}",
            self.command,
            args.join(" "),
            local.display(),
            destination
        );

        let output = Command::new(&self.command)
            .args(&args)
            .arg(local)
            .arg(destination)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                BackupError::Transfer(format!("Failed to run '{}': {}", self.command, e))
            })?;

        if !output.status.success() {
            return Err(BackupError::Transfer(format!(
                "{} failed for {} -> {}: {}\nStderr: {}",
                self.command,
                local.display(),
                destination,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}

/// Split an option string the way a POSIX shell would
pub fn tokenize_options(options: &str) -> BackupResult<Vec<String>> {
    shlex::split(options).ok_or_else(|| {
        BackupError::Transfer(format!("Failed to parse transfer options '{}'", options))
    })
}
