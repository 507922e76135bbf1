//! Docker Compose collaborators
//!
//! Everything here shells out to the compose CLI. The pipeline only sees
//! the [`StackController`] and [`VolumeResolver`] traits, so tests can swap
//! in fakes.

pub mod compose;
pub mod volumes;

pub use compose::{ComposeCommand, ComposeStack, StackController};
pub use volumes::{extract_bind_sources, ComposeVolumes, VolumeResolver};
