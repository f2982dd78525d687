//! Watcher - the polling loop that drives promotions.
//!
//! One cycle: scan slots -> locate artifact -> promote -> activate, for every
//! slot in name order, then sleep. A failure in one slot is logged and the
//! cycle moves on to the next slot. A failure to read the staging root ends
//! the cycle early but not the loop; the next cycle tries again.
//!
//! Only one watcher may run against a given staging root. Two instances race
//! on the same files.

use crate::activator::{ServiceActivator, ServiceManager};
use crate::locator::locate_artifact;
use crate::promotion::{PromotionEngine, PromotionOutcome};
use crate::scanner::scan_slots;
use chrono::{DateTime, Utc};
use promoter_common::{AmbiguityPolicy, Config, DeployError, PromotionFailure, Slot};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// What happened to one slot during a cycle.
#[derive(Debug)]
pub enum SlotOutcome {
    /// No pending artifact
    Idle,
    /// Dry run: this artifact would have been promoted
    WouldPromote { artifact: String },
    /// Artifact installed; restart may still have failed
    Promoted {
        outcome: PromotionOutcome,
        restart: Result<String, DeployError>,
    },
    Failed(PromotionFailure),
    /// Slot directory unreadable or ambiguous
    LocateFailed(DeployError),
}

#[derive(Debug)]
pub struct SlotReport {
    pub slot: String,
    pub outcome: SlotOutcome,
}

impl SlotReport {
    pub fn is_failure(&self) -> bool {
        match &self.outcome {
            SlotOutcome::Idle | SlotOutcome::WouldPromote { .. } => false,
            SlotOutcome::Promoted { restart, .. } => restart.is_err(),
            SlotOutcome::Failed(_) | SlotOutcome::LocateFailed(_) => true,
        }
    }
}

/// Summary of one scan pass.
#[derive(Debug)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub scan_error: Option<DeployError>,
    pub slots: Vec<SlotReport>,
}

impl CycleReport {
    pub fn promoted(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s.outcome, SlotOutcome::Promoted { .. }))
            .count()
    }

    pub fn idle(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s.outcome, SlotOutcome::Idle))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.slots.iter().filter(|s| s.is_failure()).count()
    }

    /// No scan error and no slot failure, restart failures included.
    pub fn is_clean(&self) -> bool {
        self.scan_error.is_none() && self.failed() == 0
    }

    pub fn slot(&self, name: &str) -> Option<&SlotReport> {
        self.slots.iter().find(|s| s.slot == name)
    }

    pub fn log_summary(&self) {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        if let Some(e) = &self.scan_error {
            error!("Cycle aborted: {}", e);
            return;
        }
        info!(
            "Cycle finished in {}ms: {} slot(s), {} promoted, {} idle, {} failed",
            elapsed.num_milliseconds(),
            self.slots.len(),
            self.promoted(),
            self.idle(),
            self.failed()
        );
    }
}

pub struct Watcher {
    staging_root: PathBuf,
    runtime_dir: PathBuf,
    interval: Duration,
    artifact_extension: String,
    policy: AmbiguityPolicy,
    dry_run: bool,
    engine: PromotionEngine,
    activator: ServiceActivator,
}

impl Watcher {
    pub fn new(config: &Config, manager: Box<dyn ServiceManager>) -> Self {
        Self {
            staging_root: config.paths.staging_root.clone(),
            runtime_dir: config.paths.runtime_dir.clone(),
            interval: Duration::from_secs(config.watch.interval_secs),
            artifact_extension: config.watch.artifact_extension.clone(),
            policy: config.watch.ambiguity,
            dry_run: false,
            engine: PromotionEngine::from_config(config),
            activator: ServiceActivator::new(
                &config.watch.descriptor_extension,
                config.watch.ambiguity,
                manager,
            ),
        }
    }

    /// Locate only; no file is touched and no service restarted.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one full pass over every slot.
    pub fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();

        let slots = match scan_slots(&self.staging_root, &self.runtime_dir) {
            Ok(slots) => slots,
            Err(e) => {
                return CycleReport {
                    started_at,
                    scan_error: Some(e),
                    slots: Vec::new(),
                }
            }
        };

        let slots = slots
            .iter()
            .map(|slot| SlotReport {
                slot: slot.name().to_string(),
                outcome: self.process_slot(slot),
            })
            .collect();

        CycleReport {
            started_at,
            scan_error: None,
            slots,
        }
    }

    fn process_slot(&self, slot: &Slot) -> SlotOutcome {
        let pending = match locate_artifact(slot, &self.artifact_extension, self.policy) {
            Ok(Some(pending)) => pending,
            Ok(None) => return SlotOutcome::Idle,
            Err(e) => {
                error!(slot = %slot.name(), "cannot inspect slot: {}", e);
                return SlotOutcome::LocateFailed(e);
            }
        };

        if self.dry_run {
            info!(
                slot = %slot.name(),
                "[DRY-RUN] Would promote {} to {}",
                pending.file_name,
                slot.runtime_path().display()
            );
            return SlotOutcome::WouldPromote {
                artifact: pending.file_name,
            };
        }

        let outcome = match self.engine.promote(slot, &pending) {
            Ok(outcome) => outcome,
            Err(failure) => {
                error!(
                    slot = %slot.name(),
                    "promotion of {} failed while {} at step {}: {}",
                    pending.file_name,
                    failure.phase,
                    failure.error.step(),
                    failure.error
                );
                for step in &failure.completed {
                    warn!(slot = %slot.name(), "already done: {}", step);
                }
                return SlotOutcome::Failed(failure);
            }
        };

        info!(
            slot = %slot.name(),
            "Old file: {} New file: {} (delivered as {})",
            outcome.previous.as_deref().unwrap_or("<none>"),
            outcome.installed_as,
            outcome.delivered_as
        );

        // The artifact stays promoted whatever happens here
        let restart = self.activator.activate(slot.dir());
        match &restart {
            Ok(service) => info!(slot = %slot.name(), "Service restarted: {}", service),
            Err(e) => error!(
                slot = %slot.name(),
                "artifact promoted but restart failed at step {}: {}",
                e.step(),
                e
            ),
        }

        SlotOutcome::Promoted { outcome, restart }
    }

    /// Poll until `shutdown` flips to true or its sender is dropped.
    ///
    /// Cycles run on the blocking pool. A cycle that has started is always
    /// allowed to finish.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Watching {} -> {} every {}s{}",
            self.staging_root.display(),
            self.runtime_dir.display(),
            self.interval.as_secs(),
            if self.dry_run { " (dry run)" } else { "" }
        );

        loop {
            let watcher = Arc::clone(&self);
            match tokio::task::spawn_blocking(move || watcher.run_cycle()).await {
                Ok(report) => report.log_summary(),
                Err(e) => error!("Cycle panicked: {}", e),
            }

            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {}
            }

            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }
        }

        info!("Watcher stopped");
    }
}
