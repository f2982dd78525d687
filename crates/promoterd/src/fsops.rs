//! File primitives used by promotion.
//!
//! Each call opens, uses and drops its handles before returning, error paths
//! included. Nothing here sleeps to wait for other handles to go away; deletes
//! retry a bounded number of times instead.

use promoter_common::{DeleteRetry, DeployError};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Copy `from` to `to`, replacing `to` if it exists. Returns bytes written.
pub fn copy_file(from: &Path, to: &Path) -> Result<u64, DeployError> {
    let src = File::open(from).map_err(|source| DeployError::ArtifactOpen {
        path: from.to_path_buf(),
        source,
    })?;
    // Refuse before the destination is created and truncated
    let is_dir = src.metadata().map(|m| m.is_dir()).unwrap_or(false);
    if is_dir {
        return Err(DeployError::ArtifactOpen {
            path: from.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Other, "is a directory"),
        });
    }
    let dst = File::create(to).map_err(|source| DeployError::ArtifactCreate {
        path: to.to_path_buf(),
        source,
    })?;

    let copy_err = |source| DeployError::ArtifactCopy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    let mut reader = BufReader::new(src);
    let mut writer = BufWriter::new(dst);
    let bytes = io::copy(&mut reader, &mut writer).map_err(copy_err)?;
    let dst = writer.into_inner().map_err(|e| copy_err(e.into_error()))?;
    dst.sync_all().map_err(copy_err)?;

    // Keep the source permissions (executable bits matter for binaries)
    if let Ok(meta) = reader.get_ref().metadata() {
        if let Err(e) = fs::set_permissions(to, meta.permissions()) {
            debug!("could not copy permissions onto {}: {}", to.display(), e);
        }
    }

    debug!("copied {} -> {} ({} bytes)", from.display(), to.display(), bytes);
    Ok(bytes)
}

pub fn rename_file(from: &Path, to: &Path) -> Result<(), DeployError> {
    fs::rename(from, to).map_err(|source| DeployError::ArtifactRename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

/// Remove `path`, retrying up to `retry.attempts` times.
///
/// Attempt N waits `backoff_ms * N` before the next try. A file that is
/// already gone counts as removed.
pub fn remove_with_retry(path: &Path, retry: &DeleteRetry) -> Result<(), DeployError> {
    let attempts = retry.attempts.max(1);
    let mut attempt = 1;

    loop {
        match fs::remove_file(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} already removed", path.display());
                return Ok(());
            }
            Err(source) if attempt >= attempts => {
                return Err(DeployError::ArtifactDelete {
                    path: path.to_path_buf(),
                    attempts,
                    source,
                });
            }
            Err(e) => {
                warn!(
                    "remove {} failed (attempt {}/{}): {}",
                    path.display(),
                    attempt,
                    attempts,
                    e
                );
                thread::sleep(Duration::from_millis(
                    retry.backoff_ms.saturating_mul(u64::from(attempt)),
                ));
                attempt += 1;
            }
        }
    }
}

/// Flush the directory entry itself so a rename survives a crash.
pub fn sync_dir(dir: &Path) {
    match File::open(dir) {
        Ok(handle) => {
            if let Err(e) = handle.sync_all() {
                debug!("fsync of {} failed: {}", dir.display(), e);
            }
        }
        Err(e) => debug!("cannot open {} for fsync: {}", dir.display(), e),
    }
}
