//! A directory of JSON documents addressed by string keys.

use crate::document::{DocumentFormat, JsonDocument};
use crate::error::{StoreError, StoreResult};
use std::path::{Path, PathBuf};

const EXTENSION: &str = "json";

/// One document per key, stored as `<dir>/<percent-encoded key>.json`.
#[derive(Debug, Clone)]
pub struct KeyedDocuments<F> {
    dir: PathBuf,
    format: F,
}

impl<F: DocumentFormat + Clone> KeyedDocuments<F> {
    pub fn new(dir: impl Into<PathBuf>, format: F) -> Self {
        Self { dir: dir.into(), format }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn document(&self, key: &str) -> JsonDocument<F> {
        JsonDocument::new(self.file_for(key), self.format.clone())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.file_for(key).is_file()
    }

    /// All keys currently stored, sorted.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(key) = urlencoding::decode(stem) {
                keys.push(key.into_owned());
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Remove the document for `key`. Returns whether it existed.
    pub fn remove(&self, key: &str) -> StoreResult<bool> {
        let path = self.file_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", urlencoding::encode(key)))
    }
}

/// Delete everything inside `dir` while keeping the directory itself.
pub fn clear_dir(dir: &Path) -> StoreResult<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e));
        }
        Err(e) => return Err(StoreError::io(dir, e)),
    };

    for entry in entries {
        let path = entry.map_err(|e| StoreError::io(dir, e))?.path();
        let removed = if path.is_dir() { std::fs::remove_dir_all(&path) } else { std::fs::remove_file(&path) };
        removed.map_err(|e| StoreError::io(&path, e))?;
    }
    Ok(())
}
