//! Advisory file locks guarding read-modify-write cycles.

use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::trace;

/// An exclusive advisory lock on a sidecar file.
///
/// The lock is released when the guard is dropped. Locks are per open file
/// description, so a process must not take the same lock twice.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until the exclusive lock on `path` is acquired, creating the
    /// lock file (and its parent directories) if needed.
    pub fn exclusive(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;
        file.lock_exclusive().map_err(|e| StoreError::io(path, e))?;
        trace!(path = %path.display(), "acquired lock");

        Ok(Self { file, path: path.to_path_buf() })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock anyway.
        let _ = FileExt::unlock(&self.file);
        trace!(path = %self.path.display(), "released lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("doc.json.lock");

        let lock = FileLock::exclusive(&path).unwrap();
        assert!(path.exists());
        assert_eq!(lock.path(), path.as_path());
    }

    #[test]
    fn test_lock_is_reacquirable_after_drop() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.json.lock");

        drop(FileLock::exclusive(&path).unwrap());
        let again = FileLock::exclusive(&path);
        assert!(again.is_ok());
    }

    #[test]
    fn test_lock_excludes_other_handles() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.json.lock");

        let held = FileLock::exclusive(&path).unwrap();
        let other = std::fs::File::open(&path).unwrap();
        assert!(other.try_lock_exclusive().is_err());

        drop(held);
        assert!(other.try_lock_exclusive().is_ok());
        FileExt::unlock(&other).unwrap();
    }
}
