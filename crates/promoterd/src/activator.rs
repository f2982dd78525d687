//! Service activation after a promotion.
//!
//! The slot's descriptor file (`<name>.service` by default) names the unit to
//! restart. Restarting goes through the `ServiceManager` seam so the daemon
//! only depends on "restart this by name", not on a particular init system.

use crate::locator::{list_candidates, pick_one};
use promoter_common::{AmbiguityPolicy, Config, DeployError, ServiceDescriptor};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, warn};

/// Restart-by-name capability of the OS service manager.
pub trait ServiceManager: Send + Sync {
    /// Restart `service`. The error string is the reason reported to the operator.
    fn restart(&self, service: &str) -> Result<(), String>;
}

/// Runs an external command with the service name appended,
/// `systemctl restart <name>` by default.
pub struct CommandServiceManager {
    program: String,
    args: Vec<String>,
}

impl CommandServiceManager {
    /// `command` is the program followed by its leading arguments.
    pub fn new(command: &[String]) -> Self {
        let (program, args) = match command.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => ("systemctl".to_string(), vec!["restart".to_string()]),
        };
        Self { program, args }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.service.restart_command)
    }

    pub fn describe(&self, service: &str) -> String {
        let mut parts = vec![self.program.as_str()];
        parts.extend(self.args.iter().map(String::as_str));
        parts.push(service);
        parts.join(" ")
    }
}

impl ServiceManager for CommandServiceManager {
    fn restart(&self, service: &str) -> Result<(), String> {
        info!("Executing: {}", self.describe(service));

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(service)
            .output()
            .map_err(|e| format!("failed to execute {}: {}", self.program, e))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        Err(format!("exit status {}: {}", code, stderr.trim()))
    }
}

/// Finds the slot's descriptor and asks the service manager to restart it.
pub struct ServiceActivator {
    extension: String,
    policy: AmbiguityPolicy,
    manager: Box<dyn ServiceManager>,
}

impl ServiceActivator {
    pub fn new(extension: &str, policy: AmbiguityPolicy, manager: Box<dyn ServiceManager>) -> Self {
        Self {
            extension: extension.to_string(),
            policy,
            manager,
        }
    }

    /// Descriptor in `slot_dir`, chosen with the configured ambiguity policy.
    pub fn find_descriptor(&self, slot_dir: &Path) -> Result<ServiceDescriptor, DeployError> {
        let candidates = list_candidates(slot_dir, &self.extension)?;
        let chosen = pick_one(candidates, self.policy, "descriptor", slot_dir)?;

        chosen
            .and_then(|name| ServiceDescriptor::from_file_name(&name, &self.extension))
            .ok_or_else(|| DeployError::DescriptorNotFound {
                slot_dir: slot_dir.to_path_buf(),
                extension: self.extension.clone(),
            })
    }

    /// Restart the service named by the slot's descriptor. Returns its name.
    pub fn activate(&self, slot_dir: &Path) -> Result<String, DeployError> {
        let descriptor = self.find_descriptor(slot_dir)?;
        debug!(
            "descriptor {} names service {}",
            descriptor.file_name, descriptor.service
        );

        match self.manager.restart(&descriptor.service) {
            Ok(()) => {
                info!("Service {} restarted", descriptor.service);
                Ok(descriptor.service)
            }
            Err(reason) => {
                warn!("Service {} restart failed: {}", descriptor.service, reason);
                Err(DeployError::ServiceRestart {
                    service: descriptor.service,
                    reason,
                })
            }
        }
    }
}
