//! Configuration module for stack-backup
//!
//! This module provides configuration management including:
//! - YAML config file loading with defaults
//! - Flag and environment overrides
//! - Validation before any project is processed

pub mod settings;

pub use settings::{RsyncSettings, Settings, SettingsOverrides};
