//! Slot data model.
//!
//! A slot is one staging subdirectory. Its directory name is also the name of
//! the active artifact in the runtime directory, and is fixed when the slot is
//! discovered.

use std::path::{Path, PathBuf};

/// Suffix that replaces the artifact's extension on the backup copy.
pub const BACKUP_SUFFIX: &str = "old";

/// One deployable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    name: String,
    dir: PathBuf,
    runtime_path: PathBuf,
}

impl Slot {
    pub fn new(name: impl Into<String>, staging_root: &Path, runtime_dir: &Path) -> Self {
        let name = name.into();
        let dir = staging_root.join(&name);
        let runtime_path = runtime_dir.join(&name);
        Self {
            name,
            dir,
            runtime_path,
        }
    }

    /// Directory name, also the canonical artifact name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<staging-root>/<slot>`
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<runtime-dir>/<slot>`, the currently active artifact.
    pub fn runtime_path(&self) -> &Path {
        &self.runtime_path
    }

    /// Where a pending artifact sits after it is renamed to the canonical name.
    pub fn staged_path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    /// `<slot-name-without-extension>.old`
    pub fn backup_name(&self) -> String {
        format!("{}.{}", strip_extension(&self.name), BACKUP_SUFFIX)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(self.backup_name())
    }

    /// Hidden temporary used by atomic promotion, next to the runtime artifact.
    pub fn runtime_temp_path(&self) -> PathBuf {
        let parent = self.runtime_path.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!(".{}.promoting", self.name))
    }
}

/// A delivered artifact waiting in a slot directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingArtifact {
    pub file_name: String,
    pub path: PathBuf,
}

/// Unit file whose stem names the service to restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub file_name: String,
    pub service: String,
}

impl ServiceDescriptor {
    /// Build from a file name ending in `.<extension>`.
    pub fn from_file_name(file_name: &str, extension: &str) -> Option<Self> {
        let service = file_name.strip_suffix(extension)?.strip_suffix('.')?;
        if service.is_empty() {
            return None;
        }
        Some(Self {
            file_name: file_name.to_string(),
            service: service.to_string(),
        })
    }
}

/// Drop the last `.ext` from a file name. Leading-dot names are kept whole.
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// True when `file_name` ends in `.<extension>` and has a non-empty stem.
pub fn has_extension(file_name: &str, extension: &str) -> bool {
    match file_name.strip_suffix(extension) {
        Some(stem) => stem.len() > 1 && stem.ends_with('.'),
        None => false,
    }
}
