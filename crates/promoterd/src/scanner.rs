//! Staging root scanner - one slot per immediate subdirectory.

use promoter_common::{DeployError, Slot};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// List the slots under `staging_root`, sorted by name. No recursion.
pub fn scan_slots(staging_root: &Path, runtime_dir: &Path) -> Result<Vec<Slot>, DeployError> {
    let read_err = |source| DeployError::DirectoryRead {
        path: staging_root.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(staging_root).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(e) => {
                warn!("cannot stat {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if !file_type.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => warn!("skipping slot with non UTF-8 name {:?}", raw),
        }
    }

    names.sort();
    debug!("found {} slot(s) under {}", names.len(), staging_root.display());

    Ok(names
        .into_iter()
        .map(|name| Slot::new(name, staging_root, runtime_dir))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_only_directories_become_slots() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir(root.join("svc-b")).unwrap();
        fs::create_dir(root.join("svc-a")).unwrap();
        fs::create_dir_all(root.join("svc-a/nested")).unwrap();
        fs::write(root.join("README"), b"x").unwrap();

        let slots = scan_slots(root, Path::new("/opt/app")).unwrap();
        let names: Vec<&str> = slots.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["svc-a", "svc-b"]);
        assert_eq!(slots[0].runtime_path(), Path::new("/opt/app/svc-a"));
    }

    #[test]
    fn test_empty_root() {
        let temp = TempDir::new().unwrap();
        assert!(scan_slots(temp.path(), Path::new("/opt/app")).unwrap().is_empty());
    }

    #[test]
    fn test_missing_root_is_directory_read_error() {
        let temp = TempDir::new().unwrap();
        let err = scan_slots(&temp.path().join("absent"), Path::new("/opt/app")).unwrap_err();
        assert_eq!(err.step(), "scan");
    }
}
