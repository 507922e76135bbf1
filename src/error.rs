//! Custom error types for stack-backup
//!
//! This module defines the error hierarchy for the application using thiserror
//! for ergonomic error definitions. Only `Config` and `Discovery` errors are
//! allowed to end a run; everything else is scoped to a single project.

use thiserror::Error;

/// The main error type for stack-backup operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Settings could not be resolved or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// The compose root could not be enumerated
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// A stop/status/pull/start command failed
    #[error("Stack control error: {0}")]
    StackControl(String),

    /// Appdata paths could not be resolved from a definition file
    #[error("Volume resolution error: {0}")]
    VolumeResolution(String),

    /// Copying into staging or writing the archive failed
    #[error("Archive error: {0}")]
    Archive(String),

    /// Shipping an archive off-host failed
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Malformed exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl BackupError {
    /// Create a pattern error for the given pattern
    pub fn pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Errors that terminate the whole run instead of a single project
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Discovery(_))
    }

    /// Check if this is a malformed-pattern error
    pub fn is_pattern(&self) -> bool {
        matches!(self, Self::Pattern { .. })
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<zip::result::ZipError> for BackupError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

/// Result type alias for stack-backup operations
pub type BackupResult<T> = Result<T, BackupError>;
