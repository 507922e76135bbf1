//! Logging setup
//!
//! Console output goes to stdout, colored only when stdout is a terminal. When
//! a log file is configured, the same events are appended to it as plain text
//! and the file is rotated by size. `RUST_LOG` overrides the level chosen from
//! the `verbose` setting.

use std::fs::{self, OpenOptions};
use std::io::{self, IsTerminal};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use tracing::{debug, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{BackupError, BackupResult};

const BYTES_PER_MB: usize = 1024 * 1024;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// When the log file is rotated and how many old files are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRotation {
    /// Size at which the active file is rotated
    pub max_size_mb: u64,

    /// Rotated files kept; 0 keeps all of them
    pub max_backups: usize,

    /// Rotated files older than this are removed at startup; 0 disables
    pub max_age_days: u64,

    /// Gzip rotated files
    pub compress: bool,
}

impl Default for LogRotation {
    fn default() -> Self {
        Self {
            max_size_mb: 100,
            max_backups: 3,
            max_age_days: 28,
            compress: false,
        }
    }
}

impl LogRotation {
    fn max_bytes(&self) -> usize {
        usize::try_from(self.max_size_mb.max(1))
            .unwrap_or(usize::MAX / BYTES_PER_MB)
            .saturating_mul(BYTES_PER_MB)
    }

    fn kept_backups(&self) -> usize {
        if self.max_backups == 0 {
            usize::MAX
        } else {
            self.max_backups
        }
    }

    fn compression(&self) -> Compression {
        if self.compress {
            Compression::OnRotate(0)
        } else {
            Compression::None
        }
    }
}

/// Install the global subscriber
///
/// Fails only if a subscriber is already installed. A log file that cannot be
/// opened is reported and console logging continues on its own.
pub fn init(verbose: bool, log_file: Option<&Path>, rotation: &LogRotation) -> BackupResult<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let console = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(io::stdout().is_terminal())
        .with_target(false);

    let (writer, file_error) = match log_file
        .map(|path| open_rotating(path, rotation.max_bytes(), rotation))
        .transpose()
    {
        Ok(writer) => (writer, None),
        Err(e) => (None, Some(e)),
    };
    let file_layer = writer.map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(writer))
            .with_ansi(false)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| BackupError::Config(format!("Failed to initialise logging: {}", e)))?;

    if let (Some(path), Some(e)) = (log_file, file_error) {
        warn!(
            "Could not open log file '{}': {}. Logging to console only.",
            path.display(),
            e
        );
    }

    Ok(())
}

/// Open `path` for appending behind a size-based rotator
///
/// The file is opened once up front so an unwritable location is reported as
/// an error instead of failing on every write.
fn open_rotating(
    path: &Path,
    max_bytes: usize,
    rotation: &LogRotation,
) -> io::Result<FileRotate<AppendCount>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)?;

    if rotation.max_age_days > 0 {
        let max_age = Duration::from_secs(rotation.max_age_days.saturating_mul(SECONDS_PER_DAY));
        prune_rotated(path, max_age)?;
    }

    Ok(FileRotate::new(
        path,
        AppendCount::new(rotation.kept_backups()),
        ContentLimit::Bytes(max_bytes),
        rotation.compression(),
        #[cfg(unix)]
        None,
    ))
}

/// Remove rotated copies of `path` (`<name>.1`, `<name>.2.gz`, ...) older than `max_age`
fn prune_rotated(path: &Path, max_age: Duration) -> io::Result<()> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(());
    };
    let prefix = format!("{}.", name);
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent,
        None => Path::new("."),
    };
    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return Ok(());
    };

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(suffix) = file_name.to_str().and_then(|n| n.strip_prefix(&prefix)) else {
            continue;
        };
        if !suffix.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if modified < cutoff {
            debug!("Removing expired log file {}", entry.path().display());
            fs::remove_file(entry.path())?;
        }
    }

    Ok(())
}
