//! Server settings from an optional TOML file.
//!
//! Precedence, highest first:
//! 1. CLI arguments and `KILN_*` environment variables (handled by clap)
//! 2. The file passed with `--config`
//! 3. Built-in defaults

use anyhow::Context;
use kiln_dispatch::ServerConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Every field is optional so a file only overrides what it names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub reset: Option<bool>,
    pub public_url: Option<String>,
    pub log_level: Option<String>,
    pub json_logs: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub reset: bool,
    pub public_url: Option<String>,
}

/// Layer `overrides` over `file` over the defaults.
pub fn resolve(file: FileConfig, overrides: Overrides) -> ServerConfig {
    let defaults = ServerConfig::default();
    ServerConfig {
        host: overrides.host.or(file.host).unwrap_or(defaults.host),
        port: overrides.port.or(file.port).unwrap_or(defaults.port),
        data_dir: overrides.data_dir.or(file.data_dir).unwrap_or(defaults.data_dir),
        reset: overrides.reset || file.reset.unwrap_or(defaults.reset),
        public_url: overrides.public_url.or(file.public_url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        assert_eq!(resolve(FileConfig::default(), Overrides::default()), ServerConfig::default());
    }

    #[test]
    fn test_cli_beats_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(&path, "port = 9000\ndata_dir = \"/srv/tickets\"\nreset = true\n").unwrap();

        let file = FileConfig::load(&path).unwrap();
        let config = resolve(file, Overrides { port: Some(9100), ..Overrides::default() });

        assert_eq!(config.port, 9100);
        assert_eq!(config.data_dir, PathBuf::from("/srv/tickets"));
        assert!(config.reset);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(&path, "prot = 9000\n").unwrap();
        assert!(FileConfig::load(&path).is_err());
    }
}
