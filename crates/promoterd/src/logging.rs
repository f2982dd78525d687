//! Log setup: stdout always, plus an optional rotating file.

use anyhow::{Context, Result};
use promoter_common::{LogRotation, LoggingConfig};
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// RUST_LOG wins over `config.level`. The returned guard flushes the file
/// writer on drop and must live as long as the process.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (writer, guard) = file_writer(path, config.rotation, config.max_files)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(guard)
}

fn file_writer(
    path: &Path,
    rotation: LogRotation,
    max_files: usize,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("promoterd.log");

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let appender = Builder::new()
        .rotation(rotation_of(rotation))
        .filename_prefix(prefix)
        .max_log_files(max_files.max(1))
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))?;

    Ok(tracing_appender::non_blocking(appender))
}

fn rotation_of(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Never => Rotation::NEVER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_writer_creates_directory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("logs/nested/promoterd.log");

        let (_writer, _guard) = file_writer(&path, LogRotation::Never, 3).unwrap();
        assert!(temp.path().join("logs/nested").is_dir());
    }

    #[test]
    fn test_rotation_mapping() {
        assert_eq!(rotation_of(LogRotation::Hourly), Rotation::HOURLY);
        assert_eq!(rotation_of(LogRotation::Never), Rotation::NEVER);
    }
}
