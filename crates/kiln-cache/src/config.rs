//! Cache configuration.
//!
//! Defaults reproduce the classic layout: artifacts under `<root>/models`,
//! the lookup table at `<root>/models/lookup_table.json`, ids shaped like
//! `0.data`, and entries stored under the `models` key.

use crate::error::{CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Key names used inside the lookup table document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableKeys {
    pub entries: String,
    pub path: String,
    pub creator: String,
    pub description: String,
}

impl Default for TableKeys {
    fn default() -> Self {
        Self {
            entries: "models".to_string(),
            path: "path".to_string(),
            creator: "creator".to_string(),
            description: "parameters".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub root: PathBuf,

    /// Directory holding artifact files. Defaults to `<root>/models`.
    pub models_dir: Option<PathBuf>,

    /// Lookup table path. Defaults to `<models_dir>/lookup_table.json`.
    pub table_path: Option<PathBuf>,

    /// Load (and create if missing) the lookup table when the manager opens.
    pub load_table: bool,

    /// Surface lookup table corruption instead of reinitializing the table.
    pub strict: bool,

    pub id_template: String,
    pub index_key: String,
    pub keys: TableKeys,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            models_dir: None,
            table_path: None,
            load_table: true,
            strict: false,
            id_template: "{index}.data".to_string(),
            index_key: "index".to_string(),
            keys: TableKeys::default(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), ..Self::default() }
    }

    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> CacheResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CacheError::Config(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content).map_err(|e| CacheError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Absolute artifact directory.
    pub fn resolved_models_dir(&self) -> CacheResult<PathBuf> {
        let dir = self.models_dir.clone().unwrap_or_else(|| self.root.join("models"));
        Ok(std::path::absolute(dir)?)
    }

    /// Absolute lookup table path.
    pub fn resolved_table_path(&self) -> CacheResult<PathBuf> {
        let path = match &self.table_path {
            Some(path) => path.clone(),
            None => self.resolved_models_dir()?.join("lookup_table.json"),
        };
        Ok(std::path::absolute(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_paths_derive_from_root() {
        let temp = TempDir::new().unwrap();
        let config = CacheConfig::new(temp.path());

        assert_eq!(config.resolved_models_dir().unwrap(), temp.path().join("models"));
        assert_eq!(config.resolved_table_path().unwrap(), temp.path().join("models").join("lookup_table.json"));
    }

    #[test]
    fn test_load_partial_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.toml");
        std::fs::write(
            &path,
            r#"
root = "/data/experiments"
id_template = "model-{index}.pkl"
strict = true

[keys]
description = "description"
"#,
        )
        .unwrap();

        let config = CacheConfig::load_from_file(&path).unwrap();
        assert_eq!(config.root, PathBuf::from("/data/experiments"));
        assert_eq!(config.id_template, "model-{index}.pkl");
        assert!(config.strict);
        assert!(config.load_table);
        assert_eq!(config.keys.entries, "models");
        assert_eq!(config.keys.description, "description");
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = CacheConfig::load_from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }
}
