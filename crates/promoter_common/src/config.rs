//! Configuration management for promoterd.
//!
//! Loads settings from /etc/promoter/config.toml, falling back to
//! CICD/cicd.toml under the working directory.

use crate::slot::BACKUP_SUFFIX;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/promoter/config.toml";

/// Working-directory relative fallback
pub const LOCAL_CONFIG_PATH: &str = "CICD/cicd.toml";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("paths.staging_root is not set")]
    MissingStagingRoot,

    #[error("paths.runtime_dir is not set")]
    MissingRuntimeDir,

    #[error("staging root and runtime directory must differ ({0})")]
    SameDirectories(String),

    #[error("watch.interval_secs must be greater than zero")]
    ZeroInterval,

    #[error("watch.{0} must not be empty")]
    EmptyExtension(&'static str),

    #[error("watch.{0} must not be '{1}', backups use that suffix")]
    ReservedExtension(&'static str, &'static str),

    #[error("artifact and descriptor extensions are both '{0}'")]
    ExtensionClash(String),

    #[error("service.restart_command must name a program")]
    EmptyRestartCommand,

    #[error("delete_retry.attempts must be at least 1")]
    ZeroDeleteAttempts,
}

/// Filesystem locations supplied by the operator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// One subdirectory per slot
    #[serde(default)]
    pub staging_root: PathBuf,

    /// Holds the active artifact of every slot
    #[serde(default)]
    pub runtime_dir: PathBuf,
}

/// What to do when a slot holds more than one candidate file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Take the lexicographically first name and warn about the rest
    #[default]
    First,
    /// Refuse to touch the slot
    Reject,
}

/// How the new artifact is installed into the runtime directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionMode {
    /// Copy the active artifact out, delete it, copy the new one in
    #[default]
    Copy,
    /// Keep the active artifact in place and rename the new one over it
    Atomic,
}

/// Polling loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Delay between two scan passes
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Extension that marks a pending artifact (without the dot)
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,

    /// Extension that marks a service descriptor (without the dot)
    #[serde(default = "default_descriptor_extension")]
    pub descriptor_extension: String,

    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,

    #[serde(default)]
    pub mode: PromotionMode,
}

fn default_interval() -> u64 {
    60
}

fn default_artifact_extension() -> String {
    "jar".to_string()
}

fn default_descriptor_extension() -> String {
    "service".to_string()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            artifact_extension: default_artifact_extension(),
            descriptor_extension: default_descriptor_extension(),
            ambiguity: AmbiguityPolicy::default(),
            mode: PromotionMode::default(),
        }
    }
}

/// Retry budget for deleting a file that was just copied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRetry {
    #[serde(default = "default_delete_attempts")]
    pub attempts: u32,

    /// Base backoff; attempt N waits N times this
    #[serde(default = "default_delete_backoff")]
    pub backoff_ms: u64,
}

fn default_delete_attempts() -> u32 {
    5
}

fn default_delete_backoff() -> u64 {
    200
}

impl Default for DeleteRetry {
    fn default() -> Self {
        Self {
            attempts: default_delete_attempts(),
            backoff_ms: default_delete_backoff(),
        }
    }
}

/// Service manager invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Program and leading arguments; the service name is appended
    #[serde(default = "default_restart_command")]
    pub restart_command: Vec<String>,
}

fn default_restart_command() -> Vec<String> {
    vec!["systemctl".to_string(), "restart".to_string()]
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            restart_command: default_restart_command(),
        }
    }
}

/// Log file rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Logging sinks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file in addition to stdout
    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Rotated files kept on disk
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_files() -> usize {
    5
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            rotation: LogRotation::default(),
            max_files: default_max_files(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub delete_retry: DeleteRetry,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Default search order when no path is given
    pub fn default_locations() -> [&'static Path; 2] {
        [Path::new(CONFIG_PATH), Path::new(LOCAL_CONFIG_PATH)]
    }

    /// Load config from `explicit`, or from the first default location found
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        Self::load_first(&Self::default_locations())?.with_context(|| {
            format!(
                "no configuration file found (tried {} and {})",
                CONFIG_PATH, LOCAL_CONFIG_PATH
            )
        })
    }

    /// Load the first candidate that exists.
    ///
    /// `Ok(None)` means none of them exist. A file that exists but fails to
    /// read or parse is an error.
    pub fn load_first(candidates: &[&Path]) -> Result<Option<Self>> {
        for candidate in candidates {
            if candidate.exists() {
                return Self::load_from_path(candidate).map(Some);
            }
            debug!("No config at {}", candidate.display());
        }
        Ok(None)
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    /// Strip leading dots so ".jar" and "jar" mean the same thing
    pub fn normalize(&mut self) {
        let trim = |ext: &mut String| {
            let trimmed = ext.trim().trim_start_matches('.').to_string();
            *ext = trimmed;
        };
        trim(&mut self.watch.artifact_extension);
        trim(&mut self.watch.descriptor_extension);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.staging_root.as_os_str().is_empty() {
            return Err(ConfigError::MissingStagingRoot);
        }
        if self.paths.runtime_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingRuntimeDir);
        }
        if self.paths.staging_root == self.paths.runtime_dir {
            return Err(ConfigError::SameDirectories(
                self.paths.staging_root.display().to_string(),
            ));
        }
        if self.watch.interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.watch.artifact_extension.is_empty() {
            return Err(ConfigError::EmptyExtension("artifact_extension"));
        }
        if self.watch.descriptor_extension.is_empty() {
            return Err(ConfigError::EmptyExtension("descriptor_extension"));
        }
        if self.watch.artifact_extension == BACKUP_SUFFIX {
            return Err(ConfigError::ReservedExtension(
                "artifact_extension",
                BACKUP_SUFFIX,
            ));
        }
        if self.watch.descriptor_extension == BACKUP_SUFFIX {
            return Err(ConfigError::ReservedExtension(
                "descriptor_extension",
                BACKUP_SUFFIX,
            ));
        }
        if self.watch.artifact_extension == self.watch.descriptor_extension {
            return Err(ConfigError::ExtensionClash(
                self.watch.artifact_extension.clone(),
            ));
        }
        if self
            .service
            .restart_command
            .first()
            .map_or(true, |program| program.trim().is_empty())
        {
            return Err(ConfigError::EmptyRestartCommand);
        }
        if self.delete_retry.attempts == 0 {
            return Err(ConfigError::ZeroDeleteAttempts);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
[paths]
staging_root = "/srv/cicd"
runtime_dir = "/opt/app"
"#;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.paths.staging_root, PathBuf::from("/srv/cicd"));
        assert_eq!(config.watch.interval_secs, 60);
        assert_eq!(config.watch.artifact_extension, "jar");
        assert_eq!(config.watch.descriptor_extension, "service");
        assert_eq!(config.watch.ambiguity, AmbiguityPolicy::First);
        assert_eq!(config.watch.mode, PromotionMode::Copy);
        assert_eq!(config.delete_retry.attempts, 5);
        assert_eq!(config.service.restart_command, vec!["systemctl", "restart"]);
        assert!(config.logging.file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[paths]
staging_root = "/srv/cicd"
runtime_dir = "/opt/app"

[watch]
interval_secs = 15
artifact_extension = ".war"
ambiguity = "reject"
mode = "atomic"

[delete_retry]
attempts = 2
backoff_ms = 10

[service]
restart_command = ["sudo", "systemctl", "restart"]

[logging]
level = "debug"
file = "/var/log/promoter/promoterd.log"
rotation = "hourly"
max_files = 3
"#;
        let config = Config::from_toml_str(toml_str).unwrap();
        assert_eq!(config.watch.interval_secs, 15);
        assert_eq!(config.watch.artifact_extension, "war");
        assert_eq!(config.watch.ambiguity, AmbiguityPolicy::Reject);
        assert_eq!(config.watch.mode, PromotionMode::Atomic);
        assert_eq!(config.delete_retry.backoff_ms, 10);
        assert_eq!(config.service.restart_command.len(), 3);
        assert_eq!(config.logging.rotation, LogRotation::Hourly);
        assert_eq!(
            config.logging.file,
            Some(PathBuf::from("/var/log/promoter/promoterd.log"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_paths() {
        let config = Config::default();
        assert_eq!(config.validate(), Err(ConfigError::MissingStagingRoot));

        let mut config = Config::default();
        config.paths.staging_root = PathBuf::from("/srv/cicd");
        assert_eq!(config.validate(), Err(ConfigError::MissingRuntimeDir));

        config.paths.runtime_dir = PathBuf::from("/srv/cicd");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SameDirectories(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_watch_settings() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.watch.interval_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval));

        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.watch.descriptor_extension = "jar".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::ExtensionClash("jar".to_string()))
        );

        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.service.restart_command.clear();
        assert_eq!(config.validate(), Err(ConfigError::EmptyRestartCommand));

        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.delete_retry.attempts = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroDeleteAttempts));
    }

    #[test]
    fn test_validate_rejects_backup_suffix_as_extension() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.watch.artifact_extension = "old".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::ReservedExtension("artifact_extension", "old"))
        );

        let config = Config::from_toml_str(
            "[paths]\nstaging_root = \"/srv/cicd\"\nruntime_dir = \"/opt/app\"\n\n[watch]\ndescriptor_extension = \".old\"\n",
        )
        .unwrap();
        assert_eq!(
            config.validate(),
            Err(ConfigError::ReservedExtension("descriptor_extension", "old"))
        );
    }

    #[test]
    fn test_unknown_enum_value_is_parse_error() {
        let toml_str = r#"
[watch]
mode = "teleport"
"#;
        assert!(Config::from_toml_str(toml_str).is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cicd.toml");
        fs::write(&path, MINIMAL).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.paths.runtime_dir, PathBuf::from("/opt/app"));
    }

    #[test]
    fn test_load_first_skips_missing_candidates() {
        let temp = TempDir::new().unwrap();
        let absent = temp.path().join("absent.toml");
        let present = temp.path().join("cicd.toml");
        fs::write(&present, MINIMAL).unwrap();

        let config = Config::load_first(&[absent.as_path(), present.as_path()])
            .unwrap()
            .unwrap();
        assert_eq!(config.paths.staging_root, PathBuf::from("/srv/cicd"));
        assert!(Config::load_first(&[absent.as_path()]).unwrap().is_none());
    }

    #[test]
    fn test_load_first_reports_broken_file() {
        let temp = TempDir::new().unwrap();
        let broken = temp.path().join("cicd.toml");
        fs::write(&broken, "[watch]\nmode = \"atomc\"\n").unwrap();

        let err = Config::load_first(&[broken.as_path()]).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_load_explicit_missing_path_errors() {
        let temp = TempDir::new().unwrap();
        let err = Config::load(Some(&temp.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }
}
