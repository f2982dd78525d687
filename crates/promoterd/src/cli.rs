//! Command-line interface for promoterd.

use anyhow::{bail, Context, Result};
use clap::Parser;
use promoter_common::Config;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "promoterd")]
#[command(about = "Promotes staged build artifacts and restarts their services", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: /etc/promoter/config.toml, then ./CICD/cicd.toml)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Staging root, one subdirectory per slot
    #[arg(long)]
    pub staging_root: Option<PathBuf>,

    /// Directory holding the active artifacts
    #[arg(long)]
    pub runtime_dir: Option<PathBuf>,

    /// Seconds between two scan passes
    #[arg(long)]
    pub interval: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Report what would be promoted without touching anything
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Load the config file and apply command-line overrides.
    ///
    /// The file is optional when both paths are given on the command line.
    pub fn resolve_config(&self) -> Result<Config> {
        self.resolve_config_from(&Config::default_locations())
    }

    /// Same as `resolve_config`, searching `candidates` when `--config` is absent.
    ///
    /// Only a missing file falls back to defaults; a file that exists and
    /// fails to parse is always an error.
    pub fn resolve_config_from(&self, candidates: &[&Path]) -> Result<Config> {
        let paths_on_cli = self.staging_root.is_some() && self.runtime_dir.is_some();

        let loaded = match &self.config {
            Some(path) => Some(Config::load_from_path(path)?),
            None => Config::load_first(candidates)?,
        };

        let mut config = match loaded {
            Some(config) => config,
            None if paths_on_cli => {
                debug!("No config file found, using defaults with paths from the command line");
                Config::default()
            }
            None => {
                let tried: Vec<String> = candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                bail!("no configuration file found (tried {})", tried.join(", "));
            }
        };

        if let Some(root) = &self.staging_root {
            config.paths.staging_root = root.clone();
        }
        if let Some(dir) = &self.runtime_dir {
            config.paths.runtime_dir = dir.clone();
        }
        if let Some(secs) = self.interval {
            config.watch.interval_secs = secs;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from([
            "promoterd",
            "--staging-root",
            "/srv/cicd",
            "--runtime-dir",
            "/opt/app",
            "--once",
            "--dry-run",
        ]);
        assert!(cli.once);
        assert!(cli.dry_run);
        assert_eq!(cli.staging_root, Some(PathBuf::from("/srv/cicd")));
    }

    #[test]
    fn test_paths_on_cli_without_file() {
        let cli = Cli::parse_from([
            "promoterd",
            "--staging-root",
            "/srv/cicd-test-only",
            "--runtime-dir",
            "/opt/app-test-only",
            "--interval",
            "5",
        ]);
        let temp = TempDir::new().unwrap();
        let absent = temp.path().join("cicd.toml");
        let config = cli.resolve_config_from(&[absent.as_path()]).unwrap();
        assert_eq!(config.paths.staging_root, PathBuf::from("/srv/cicd-test-only"));
        assert_eq!(config.watch.interval_secs, 5);
    }

    #[test]
    fn test_overrides_apply_on_top_of_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cicd.toml");
        fs::write(
            &path,
            "[paths]\nstaging_root = \"/srv/cicd\"\nruntime_dir = \"/opt/app\"\n",
        )
        .unwrap();

        let cli = Cli::parse_from([
            "promoterd",
            "--config",
            path.to_str().unwrap(),
            "--runtime-dir",
            "/opt/other",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.paths.staging_root, PathBuf::from("/srv/cicd"));
        assert_eq!(config.paths.runtime_dir, PathBuf::from("/opt/other"));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = Cli::parse_from([
            "promoterd",
            "--staging-root",
            "/srv/cicd",
            "--runtime-dir",
            "/opt/app",
            "--interval",
            "0",
        ]);
        let temp = TempDir::new().unwrap();
        let absent = temp.path().join("cicd.toml");
        let err = cli.resolve_config_from(&[absent.as_path()]).unwrap_err();
        assert!(format!("{:#}", err).contains("interval_secs"));
    }

    #[test]
    fn test_broken_default_file_is_not_ignored() {
        let temp = TempDir::new().unwrap();
        let broken = temp.path().join("CICD/cicd.toml");
        fs::create_dir_all(broken.parent().unwrap()).unwrap();
        fs::write(&broken, "[watch]\nmode = \"atomc\"\n").unwrap();

        let cli = Cli::parse_from([
            "promoterd",
            "--staging-root",
            "/srv/a",
            "--runtime-dir",
            "/opt/b",
        ]);
        let err = cli.resolve_config_from(&[broken.as_path()]).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config"));
    }

    #[test]
    fn test_missing_file_without_paths_errors() {
        let temp = TempDir::new().unwrap();
        let absent = temp.path().join("cicd.toml");

        let cli = Cli::parse_from(["promoterd", "--staging-root", "/srv/a"]);
        let err = cli.resolve_config_from(&[absent.as_path()]).unwrap_err();
        assert!(err.to_string().contains("no configuration file found"));
    }
}
