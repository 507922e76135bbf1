//! Bind-mount discovery
//!
//! Asks compose for the fully resolved configuration and keeps the bind
//! mounts whose host side lives under the data root.

use std::collections::BTreeSet;
use std::env;
use std::path::{Component, Path, PathBuf};

use serde_yaml::Value;
use tracing::{debug, warn};

use super::compose::ComposeCommand;
use crate::error::{BackupError, BackupResult};

/// Source of a stack's persistent data paths
pub trait VolumeResolver {
    /// Absolute, existing host paths bind-mounted from under `data_root`
    fn resolve(&self, definition_file: &Path, data_root: &Path) -> BackupResult<Vec<PathBuf>>;
}

/// [`VolumeResolver`] that runs `<compose> config`
#[derive(Debug, Clone)]
pub struct ComposeVolumes {
    command: ComposeCommand,
}

impl ComposeVolumes {
    pub fn new(command: ComposeCommand) -> Self {
        Self { command }
    }
}

impl VolumeResolver for ComposeVolumes {
    fn resolve(&self, definition_file: &Path, data_root: &Path) -> BackupResult<Vec<PathBuf>> {
        let dir = definition_file.parent().ok_or_else(|| {
            BackupError::VolumeResolution(format!(
                "Definition file '{}' has no parent directory",
                definition_file.display()
            ))
        })?;

        let resolved = self
            .command
            .run(dir, &["config"], BackupError::VolumeResolution)?;

        extract_bind_sources(&resolved, data_root)
    }
}

/// Pull bind-mount sources under `data_root` out of resolved compose YAML
pub fn extract_bind_sources(yaml: &str, data_root: &Path) -> BackupResult<Vec<PathBuf>> {
    let document: Value = serde_yaml::from_str(yaml).map_err(|e| {
        BackupError::VolumeResolution(format!("Failed to parse compose config output: {}", e))
    })?;

    let data_root = absolutize(data_root)?;
    let mut found = BTreeSet::new();

    let Some(services) = document.get("services").and_then(Value::as_mapping) else {
        debug!("Compose config has no services");
        return Ok(Vec::new());
    };

    for (service, definition) in services {
        let service = service.as_str().unwrap_or("<unnamed>");
        let Some(volumes) = definition.get("volumes").and_then(Value::as_sequence) else {
            continue;
        };

        for volume in volumes {
            let Some(source) = bind_source(service, volume) else {
                continue;
            };
            if let Some(path) = accept(service, &source, &data_root) {
                found.insert(path);
            }
        }
    }

    Ok(found.into_iter().collect())
}

/// Host side of one volume entry, if it is a bind mount
fn bind_source(service: &str, volume: &Value) -> Option<String> {
    match volume {
        Value::String(short) => match short.split_once(':') {
            Some((host, _)) if !host.is_empty() => Some(host.to_string()),
            _ => {
                debug!("Service '{}': '{}' is a named volume, skipping", service, short);
                None
            }
        },
        Value::Mapping(_) => {
            let kind = volume.get("type").and_then(Value::as_str);
            if kind != Some("bind") {
                debug!(
                    "Service '{}': volume of type '{}' is not a bind mount, skipping",
                    service,
                    kind.unwrap_or("unknown")
                );
                return None;
            }
            match volume.get("source").and_then(Value::as_str) {
                Some(source) => Some(source.to_string()),
                None => {
                    warn!("Service '{}': bind mount without a source, skipping", service);
                    None
                }
            }
        }
        other => {
            warn!("Service '{}': unrecognised volume entry {:?}, skipping", service, other);
            None
        }
    }
}

fn accept(service: &str, source: &str, data_root: &Path) -> Option<PathBuf> {
    let path = clean(Path::new(source));
    if !path.is_absolute() {
        warn!(
            "Service '{}': bind source '{}' is not absolute, skipping",
            service, source
        );
        return None;
    }
    if !path.starts_with(data_root) {
        debug!(
            "Service '{}': '{}' is outside {}, skipping",
            service,
            source,
            data_root.display()
        );
        return None;
    }
    if !path.exists() {
        warn!(
            "Service '{}': bind source '{}' does not exist, skipping",
            service, source
        );
        return None;
    }
    Some(path)
}

fn absolutize(path: &Path) -> BackupResult<PathBuf> {
    if path.is_absolute() {
        return Ok(clean(path));
    }
    let cwd = env::current_dir().map_err(|e| {
        BackupError::VolumeResolution(format!("Failed to resolve current directory: {}", e))
    })?;
    Ok(clean(&cwd.join(path)))
}

/// Resolve `.` and `..` without touching the filesystem
///
/// `..` at the root stays at the root, so a cleaned absolute path can be
/// compared with `starts_with` safely.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
