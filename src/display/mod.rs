//! Display formatting for terminal output
//!
//! Provides utilities for formatting projects and run results as plain-text
//! tables.

pub mod project;

pub use project::{format_project_list, format_run_summary};
