//! Promotion engine - backs up the active artifact, then installs the pending one.
//!
//! State machine:
//! idle -> backing_up -> promoting -> done, or failed from any state before done
//!
//! The previous artifact is always copied out before anything deletes it, so an
//! interrupted promotion can leave two copies around but never zero. Nothing is
//! rolled back on failure; the returned `PromotionFailure` lists what was done.
//!
//! Two install modes:
//! - `Copy`: the active artifact is deleted after backup and the new one copied
//!   in. The runtime path is briefly absent between the two phases.
//! - `Atomic`: the active artifact stays in place; the new one is copied to a
//!   hidden temporary next to it and renamed over it. Requires the temporary
//!   and the runtime path to share a filesystem, which they do by construction.

use crate::fsops::{copy_file, remove_with_retry, rename_file, sync_dir};
use promoter_common::{
    Config, DeleteRetry, DeployError, PendingArtifact, PromotionFailure, PromotionMode,
    PromotionPhase, Slot,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of a finished promotion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionOutcome {
    pub slot: String,
    /// Name of the artifact that was active before, if there was one
    pub previous: Option<String>,
    pub backup_path: Option<PathBuf>,
    /// File name the pending artifact was delivered under
    pub delivered_as: String,
    /// Name it now has in the runtime directory
    pub installed_as: String,
    pub bytes: u64,
}

/// Tracks the current phase and the steps already performed.
struct Progress {
    phase: PromotionPhase,
    completed: Vec<String>,
}

impl Progress {
    fn new() -> Self {
        Self {
            phase: PromotionPhase::Idle,
            completed: Vec::new(),
        }
    }

    fn enter(&mut self, phase: PromotionPhase, slot: &Slot) {
        debug!(slot = %slot.name(), "promotion {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    fn done(&mut self, step: String) {
        self.completed.push(step);
    }

    /// Move to `Failed`; the failure records the phase it happened in.
    fn fail(&mut self, error: DeployError, slot: &Slot) -> PromotionFailure {
        let failed_in = self.phase;
        self.enter(PromotionPhase::Failed, slot);
        PromotionFailure::new(failed_in, std::mem::take(&mut self.completed), error)
    }
}

pub struct PromotionEngine {
    mode: PromotionMode,
    delete_retry: DeleteRetry,
}

impl PromotionEngine {
    pub fn new(mode: PromotionMode, delete_retry: DeleteRetry) -> Self {
        Self { mode, delete_retry }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.watch.mode, config.delete_retry.clone())
    }

    pub fn mode(&self) -> PromotionMode {
        self.mode
    }

    /// Promote `pending` into the runtime slot.
    ///
    /// Safe to call repeatedly and for different slots; holds no state
    /// between calls.
    pub fn promote(
        &self,
        slot: &Slot,
        pending: &PendingArtifact,
    ) -> Result<PromotionOutcome, PromotionFailure> {
        let mut progress = Progress::new();

        // A slot named `<x>.old` would stage the new artifact on top of its own backup
        let backup = slot.backup_path();
        if backup == slot.staged_path() {
            return Err(progress.fail(
                DeployError::BackupCollision {
                    slot: slot.name().to_string(),
                    path: backup,
                },
                slot,
            ));
        }

        progress.enter(PromotionPhase::BackingUp, slot);
        let previous = match self.back_up(slot, &mut progress) {
            Ok(previous) => previous,
            Err(e) => return Err(progress.fail(e, slot)),
        };

        progress.enter(PromotionPhase::Promoting, slot);
        let bytes = match self.install(slot, pending, &mut progress) {
            Ok(bytes) => bytes,
            Err(e) => return Err(progress.fail(e, slot)),
        };

        progress.enter(PromotionPhase::Done, slot);
        info!(
            slot = %slot.name(),
            "promoted {} as {} ({} bytes)",
            pending.file_name,
            slot.runtime_path().display(),
            bytes
        );

        Ok(PromotionOutcome {
            slot: slot.name().to_string(),
            backup_path: previous.as_ref().map(|_| slot.backup_path()),
            previous,
            delivered_as: pending.file_name.clone(),
            installed_as: slot.name().to_string(),
            bytes,
        })
    }

    /// Copy the active artifact to `<slot>.old`. In copy mode the runtime copy is
    /// then removed. Returns `None` on a first deployment.
    fn back_up(&self, slot: &Slot, progress: &mut Progress) -> Result<Option<String>, DeployError> {
        let active = slot.runtime_path();
        if !artifact_exists(active)? {
            info!(
                slot = %slot.name(),
                "no active artifact at {}, skipping backup",
                active.display()
            );
            return Ok(None);
        }

        let backup = slot.backup_path();
        copy_file(active, &backup)?;
        progress.done(format!("backup {} -> {}", active.display(), backup.display()));

        if self.mode == PromotionMode::Copy {
            remove_with_retry(active, &self.delete_retry)?;
            progress.done(format!("remove {}", active.display()));
        }

        info!(
            slot = %slot.name(),
            "backed up {} as {}",
            slot.name(),
            slot.backup_name()
        );
        Ok(Some(slot.name().to_string()))
    }

    fn install(
        &self,
        slot: &Slot,
        pending: &PendingArtifact,
        progress: &mut Progress,
    ) -> Result<u64, DeployError> {
        let staged = slot.staged_path();
        if pending.path != staged {
            rename_file(&pending.path, &staged)?;
            progress.done(format!(
                "rename {} -> {}",
                pending.path.display(),
                staged.display()
            ));
        }

        let bytes = match self.mode {
            PromotionMode::Copy => {
                let bytes = copy_file(&staged, slot.runtime_path())?;
                progress.done(format!(
                    "copy {} -> {}",
                    staged.display(),
                    slot.runtime_path().display()
                ));
                bytes
            }
            PromotionMode::Atomic => {
                let temp = slot.runtime_temp_path();
                let bytes = copy_file(&staged, &temp).map_err(|e| {
                    discard_temp(&temp);
                    e
                })?;
                progress.done(format!("copy {} -> {}", staged.display(), temp.display()));

                rename_file(&temp, slot.runtime_path()).map_err(|e| {
                    discard_temp(&temp);
                    e
                })?;
                progress.done(format!(
                    "rename {} -> {}",
                    temp.display(),
                    slot.runtime_path().display()
                ));
                bytes
            }
        };

        if let Some(parent) = slot.runtime_path().parent() {
            sync_dir(parent);
        }

        remove_with_retry(&staged, &self.delete_retry)?;
        progress.done(format!("remove {}", staged.display()));

        Ok(bytes)
    }
}

/// `Ok(false)` only for a genuinely missing file; other stat errors propagate.
fn artifact_exists(path: &Path) -> Result<bool, DeployError> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(DeployError::ArtifactOpen {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn discard_temp(temp: &Path) {
    if let Err(e) = fs::remove_file(temp) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("could not remove temporary {}: {}", temp.display(), e);
        }
    }
}
