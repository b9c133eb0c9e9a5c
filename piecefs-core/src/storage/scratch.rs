//! Per-run scratch directory creation.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::StorageError;
use crate::config::StorageConfig;

const DEFAULT_ROOT_NAME: &str = "piecefs";

/// Uniquely named directory the engine saves pieces into.
///
/// Removed from disk when dropped.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
    path: PathBuf,
}

impl ScratchDir {
    /// Creates the target root if needed, then a fresh scratch directory inside it.
    ///
    /// # Errors
    ///
    /// - `StorageError::TargetUnavailable` - If the root cannot be created
    /// - `StorageError::ScratchUnavailable` - If the scratch directory cannot be generated or expanded
    pub fn create(config: &StorageConfig) -> Result<Self, StorageError> {
        let root = resolve_target_root(config.target_root.as_deref());

        std::fs::create_dir_all(&root).map_err(|source| StorageError::TargetUnavailable {
            path: root.clone(),
            source,
        })?;

        let scratch_error = |source| StorageError::ScratchUnavailable {
            root: root.clone(),
            source,
        };

        let dir = tempfile::Builder::new()
            .prefix(config.scratch_prefix)
            .tempdir_in(&root)
            .map_err(scratch_error)?;
        let path = dir.path().canonicalize().map_err(scratch_error)?;

        tracing::debug!("Scratch directory ready at {}", path.display());

        Ok(Self { dir, path })
    }

    /// Canonical path of the scratch directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the directory now, reporting failures instead of ignoring them.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - If the directory could not be removed
    pub fn close(self) -> Result<(), StorageError> {
        self.dir.close()?;
        Ok(())
    }
}

/// Picks the target root: explicit, else `$HOME/piecefs`, else `<tmp>/piecefs`.
pub fn resolve_target_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(DEFAULT_ROOT_NAME),
        _ => std::env::temp_dir().join(DEFAULT_ROOT_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_root_wins() {
        let root = resolve_target_root(Some(Path::new("/srv/pieces")));
        assert_eq!(root, PathBuf::from("/srv/pieces"));
    }

    #[test]
    fn test_scratch_dir_created_under_missing_root() {
        let base = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            target_root: Some(base.path().join("nested").join("root")),
            ..Default::default()
        };

        let scratch = ScratchDir::create(&config).unwrap();
        assert!(scratch.path().is_dir());
        assert!(scratch.path().is_absolute());

        let name = scratch.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("piecefs-"));

        let path = scratch.path().to_path_buf();
        scratch.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_two_scratch_dirs_are_distinct() {
        let base = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            target_root: Some(base.path().to_path_buf()),
            ..Default::default()
        };

        let first = ScratchDir::create(&config).unwrap();
        let second = ScratchDir::create(&config).unwrap();
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn test_root_blocked_by_file_is_reported() {
        let base = tempfile::tempdir().unwrap();
        let blocker = base.path().join("occupied");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let config = StorageConfig {
            target_root: Some(blocker),
            ..Default::default()
        };

        let result = ScratchDir::create(&config);
        assert!(matches!(result, Err(StorageError::TargetUnavailable { .. })));
    }
}
