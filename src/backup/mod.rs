//! Backup engine for stack-backup
//!
//! Turns discovered compose projects into dated zip archives.
//!
//! # Architecture
//!
//! - `exclude`: glob-based exclude rules, compiled once per build
//! - `walk`: the shared tree walker used by both the staging copy and the
//!   archive write, so exclusions and the traversal error policy apply
//!   identically at both points
//! - `staging`: the temporary tree a build assembles, removed on drop
//! - `archive`: copy into staging, then zip the staging tree
//! - `runner`: the per-project stop/verify/archive/transfer/restart pipeline
//!
//! # Archive Layout
//!
//! ```text
//! <project>_<YYYYMMDD>.zip
//! ├── compose/<project>/...     copy of the compose directory
//! └── appdata/<basename>/...    one folder per bind-mounted data path
//! ```

mod archive;
mod exclude;
mod runner;
mod staging;
mod walk;

pub use archive::{archive_file_name, ArchiveBuilder};
pub use exclude::{matches, normalize, ExcludeMatcher};
pub use runner::{BackupRunner, ProjectOutcome, RunSummary, Step, StepRecord, StepStatus};
pub use staging::StagingTree;
pub use walk::{EntryKind, TraversalPolicy, WalkEntry, WalkStats, Walker};
