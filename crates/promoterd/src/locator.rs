//! Finds the pending artifact in a slot directory.
//!
//! Read-only. Candidates are sorted by file name before the ambiguity policy
//! is applied, so the result never depends on directory listing order.

use promoter_common::{AmbiguityPolicy, DeployError, PendingArtifact, Slot};
use promoter_common::slot::has_extension;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Names of regular (non-directory) entries in `dir` ending in `.<extension>`, sorted.
pub fn list_candidates(dir: &Path, extension: &str) -> Result<Vec<String>, DeployError> {
    let read_err = |source| DeployError::DirectoryRead {
        path: dir.to_path_buf(),
        source,
    };

    let mut found = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
        if is_dir {
            continue;
        }
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                warn!(
                    "skipping entry with non UTF-8 name {:?} in {}",
                    raw,
                    dir.display()
                );
                continue;
            }
        };
        if has_extension(&name, extension) {
            found.push(name);
        }
    }
    found.sort();
    Ok(found)
}

/// Apply the ambiguity policy to a sorted candidate list.
pub fn pick_one(
    mut candidates: Vec<String>,
    policy: AmbiguityPolicy,
    kind: &'static str,
    slot_dir: &Path,
) -> Result<Option<String>, DeployError> {
    if candidates.len() <= 1 {
        return Ok(candidates.pop());
    }

    match policy {
        AmbiguityPolicy::Reject => Err(DeployError::AmbiguousSlot {
            slot_dir: slot_dir.to_path_buf(),
            kind,
            candidates,
        }),
        AmbiguityPolicy::First => {
            let chosen = candidates.remove(0);
            warn!(
                "{} holds several {} files, using {} and ignoring {}",
                slot_dir.display(),
                kind,
                chosen,
                candidates.join(", ")
            );
            Ok(Some(chosen))
        }
    }
}

/// Return the pending artifact for `slot`, if any.
pub fn locate_artifact(
    slot: &Slot,
    extension: &str,
    policy: AmbiguityPolicy,
) -> Result<Option<PendingArtifact>, DeployError> {
    let candidates = list_candidates(slot.dir(), extension)?;
    let chosen = pick_one(candidates, policy, "artifact", slot.dir())?;

    Ok(chosen.map(|file_name| {
        debug!(slot = %slot.name(), "pending artifact {}", file_name);
        PendingArtifact {
            path: slot.dir().join(&file_name),
            file_name,
        }
    }))
}
