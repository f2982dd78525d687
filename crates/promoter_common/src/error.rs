//! Error types for artifact promotion.
//!
//! Every variant names the file(s) it was working on so a log line alone is
//! enough to reconstruct what partially completed.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("cannot read directory {}: {source}", .path.display())]
    DirectoryRead { path: PathBuf, source: io::Error },

    #[error("cannot open {}: {source}", .path.display())]
    ArtifactOpen { path: PathBuf, source: io::Error },

    #[error("cannot create {}: {source}", .path.display())]
    ArtifactCreate { path: PathBuf, source: io::Error },

    #[error("cannot copy {} to {}: {source}", .from.display(), .to.display())]
    ArtifactCopy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("cannot rename {} to {}: {source}", .from.display(), .to.display())]
    ArtifactRename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("cannot remove {} after {attempts} attempt(s): {source}", .path.display())]
    ArtifactDelete {
        path: PathBuf,
        attempts: u32,
        source: io::Error,
    },

    #[error("no .{extension} descriptor found in {}", .slot_dir.display())]
    DescriptorNotFound { slot_dir: PathBuf, extension: String },

    #[error("restart of service {service} failed: {reason}")]
    ServiceRestart { service: String, reason: String },

    #[error("slot {slot} cannot be promoted: its backup and staged artifact are both {}", .path.display())]
    BackupCollision { slot: String, path: PathBuf },

    #[error("slot {} holds several {kind} candidates: {}", .slot_dir.display(), .candidates.join(", "))]
    AmbiguousSlot {
        slot_dir: PathBuf,
        kind: &'static str,
        candidates: Vec<String>,
    },
}

impl DeployError {
    /// Short name of the step that failed, for log lines.
    pub fn step(&self) -> &'static str {
        match self {
            DeployError::DirectoryRead { .. } => "scan",
            DeployError::ArtifactOpen { .. } => "open",
            DeployError::ArtifactCreate { .. } => "create",
            DeployError::ArtifactCopy { .. } => "copy",
            DeployError::ArtifactRename { .. } => "rename",
            DeployError::ArtifactDelete { .. } => "remove",
            DeployError::DescriptorNotFound { .. } => "descriptor",
            DeployError::ServiceRestart { .. } => "restart",
            DeployError::AmbiguousSlot { .. } => "locate",
            DeployError::BackupCollision { .. } => "check",
        }
    }

    /// Service name carried by a restart failure.
    pub fn service(&self) -> Option<&str> {
        match self {
            DeployError::ServiceRestart { service, .. } => Some(service),
            _ => None,
        }
    }
}

/// Promotion state machine phases.
///
/// `Idle -> BackingUp -> Promoting -> Done`, with `Failed` reachable from
/// every state before `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionPhase {
    Idle,
    BackingUp,
    Promoting,
    Done,
    Failed,
}

impl fmt::Display for PromotionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromotionPhase::Idle => write!(f, "idle"),
            PromotionPhase::BackingUp => write!(f, "backing_up"),
            PromotionPhase::Promoting => write!(f, "promoting"),
            PromotionPhase::Done => write!(f, "done"),
            PromotionPhase::Failed => write!(f, "failed"),
        }
    }
}

/// A promotion that stopped part way.
///
/// `phase` is the phase the failure happened in (`Idle`, `BackingUp` or
/// `Promoting`); the engine itself ends in `Failed`. Nothing is rolled back;
/// `completed` lists the steps that did happen so the operator knows what
/// state the slot and runtime directory were left in.
#[derive(Error, Debug)]
#[error("promotion failed while {phase} at step {}: {error}", .error.step())]
pub struct PromotionFailure {
    pub phase: PromotionPhase,
    pub completed: Vec<String>,
    #[source]
    pub error: DeployError,
}

impl PromotionFailure {
    pub fn new(phase: PromotionPhase, completed: Vec<String>, error: DeployError) -> Self {
        Self {
            phase,
            completed,
            error,
        }
    }
}
