//! A fixed set of named workers sharing an experiment.
//!
//! Workers are kept sorted so every process computes the same distribution.
//! The pool is usually loaded from a small JSON file:
//!
//! ```json
//! { "allowed_users": ["ana", "bruno", "carla"], "manager": "ana", "server": "carla" }
//! ```

use crate::distribute::{Assignment, DistributeOptions, distribute};
use crate::error::{DispatchError, DispatchResult};
use crate::toggle::Toggle;
use kiln_store::{DocumentFormat, JsonDocument};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

/// Key names used in the pool's JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPoolKeys {
    pub workers: String,
    pub manager: String,
    pub server: String,
}

impl Default for UserPoolKeys {
    fn default() -> Self {
        Self {
            workers: "allowed_users".to_string(),
            manager: "manager".to_string(),
            server: "server".to_string(),
        }
    }
}

/// Contents of a pool file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPoolConfig {
    pub workers: Vec<String>,
    pub manager: Option<String>,
    pub server: Option<String>,
}

/// JSON layout of [`UserPoolConfig`] for a given set of key names.
#[derive(Debug, Clone, Default)]
pub struct UserPoolFormat {
    keys: UserPoolKeys,
}

impl UserPoolFormat {
    #[must_use]
    pub fn new(keys: UserPoolKeys) -> Self {
        Self { keys }
    }
}

impl DocumentFormat for UserPoolFormat {
    type Doc = UserPoolConfig;

    fn empty(&self) -> UserPoolConfig {
        UserPoolConfig::default()
    }

    fn decode(&self, value: Value) -> Result<UserPoolConfig, String> {
        let Value::Object(mut map) = value else {
            return Err("user pool file is not a JSON object".to_string());
        };
        let workers = match map.remove(&self.keys.workers) {
            Some(value) => serde_json::from_value(value).map_err(|e| format!("`{}`: {e}", self.keys.workers))?,
            None => return Err(format!("missing `{}`", self.keys.workers)),
        };
        let optional = |value: Option<Value>, key: &str| match value {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(format!("`{key}` must be a string, got `{other}`")),
        };
        let manager = optional(map.remove(&self.keys.manager), self.keys.manager.as_str())?;
        let server = optional(map.remove(&self.keys.server), self.keys.server.as_str())?;

        Ok(UserPoolConfig { workers, manager, server })
    }

    fn encode(&self, config: &UserPoolConfig) -> Result<Value, serde_json::Error> {
        let mut map = Map::new();
        map.insert(self.keys.workers.clone(), serde_json::to_value(&config.workers)?);
        if let Some(manager) = &config.manager {
            map.insert(self.keys.manager.clone(), Value::String(manager.clone()));
        }
        if let Some(server) = &config.server {
            map.insert(self.keys.server.clone(), Value::String(server.clone()));
        }
        Ok(Value::Object(map))
    }
}

#[derive(Debug, Clone)]
pub struct UserPool {
    workers: Vec<String>,
    manager: String,
    server: Option<String>,
    current: Option<String>,
    keys: UserPoolKeys,
    enabled: bool,
}

impl UserPool {
    /// A pool managed by the first listed worker.
    pub fn new<I, S>(workers: I) -> DispatchResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let listed: Vec<String> = workers.into_iter().map(Into::into).collect();
        let Some(manager) = listed.first().cloned() else {
            return Err(DispatchError::Config("a user pool needs at least one worker".to_string()));
        };

        let mut workers = listed;
        workers.sort();
        workers.dedup();

        Ok(Self { workers, manager, server: None, current: None, keys: UserPoolKeys::default(), enabled: true })
    }

    pub fn from_config(config: UserPoolConfig) -> DispatchResult<Self> {
        let mut pool = Self::new(config.workers)?;
        if let Some(manager) = config.manager {
            pool = pool.with_manager(manager)?;
        }
        Ok(pool.with_server(config.server))
    }

    pub fn with_manager(mut self, manager: impl Into<String>) -> DispatchResult<Self> {
        let manager = manager.into();
        self.check_worker(&manager)?;
        self.manager = manager;
        Ok(self)
    }

    #[must_use]
    pub fn with_server(mut self, server: Option<String>) -> Self {
        self.server = server;
        self
    }

    pub fn with_current(mut self, current: impl Into<String>) -> DispatchResult<Self> {
        self.set_current(current)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_keys(mut self, keys: UserPoolKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Load a pool file with the default key names.
    pub fn from_json(path: &Path) -> DispatchResult<Self> {
        Self::from_json_with_keys(path, UserPoolKeys::default())
    }

    pub fn from_json_with_keys(path: &Path, keys: UserPoolKeys) -> DispatchResult<Self> {
        let config = JsonDocument::new(path, UserPoolFormat::new(keys.clone())).read()?;
        debug!(path = %path.display(), workers = config.workers.len(), "user pool loaded");
        Ok(Self::from_config(config)?.with_keys(keys))
    }

    pub fn to_json(&self, path: &Path) -> DispatchResult<()> {
        JsonDocument::new(path, UserPoolFormat::new(self.keys.clone())).write(&self.config())?;
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> UserPoolConfig {
        UserPoolConfig {
            workers: self.workers.clone(),
            manager: Some(self.manager.clone()),
            server: self.server.clone(),
        }
    }

    /// Workers in sorted order.
    #[must_use]
    pub fn workers(&self) -> &[String] {
        &self.workers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    #[must_use]
    pub fn contains(&self, worker: &str) -> bool {
        self.workers.iter().any(|w| w == worker)
    }

    #[must_use]
    pub fn manager(&self) -> &str {
        &self.manager
    }

    #[must_use]
    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Set the worker this process runs as.
    pub fn set_current(&mut self, current: impl Into<String>) -> DispatchResult<()> {
        let current = current.into();
        self.check_worker(&current)?;
        self.current = Some(current);
        Ok(())
    }

    /// Every worker except the manager.
    pub fn clients(&self) -> impl Iterator<Item = &str> {
        self.workers.iter().map(String::as_str).filter(|w| *w != self.manager)
    }

    #[must_use]
    pub fn is_manager(&self) -> bool {
        self.current.as_deref() == Some(self.manager.as_str())
    }

    #[must_use]
    pub fn is_client(&self) -> bool {
        self.current.as_ref().is_some_and(|current| *current != self.manager)
    }

    #[must_use]
    pub fn is_server(&self) -> bool {
        self.current.is_some() && self.current == self.server
    }

    /// Partition `items` across all workers.
    pub fn distribute<T>(
        &self,
        items: impl IntoIterator<Item = T>,
        options: DistributeOptions<'_, String, T>,
    ) -> DispatchResult<Assignment<String, T>> {
        if let Some(unknown) = options.assigned_keys().find(|key| !self.contains(key)) {
            return Err(DispatchError::Config(format!(
                "preassigned worker `{unknown}` is not in the pool {:?}",
                self.workers
            )));
        }
        distribute(&self.workers, items, options)
    }

    /// The current worker's share of `items`, or all of them when disabled.
    pub fn get_iterable<T>(&self, items: Vec<T>) -> DispatchResult<Vec<T>> {
        if !self.enabled {
            return Ok(items);
        }
        let Some(current) = &self.current else {
            return Err(DispatchError::Config("no current worker set".to_string()));
        };

        let mut assignment = self.distribute(items, DistributeOptions::default())?;
        let share = assignment.shift_remove(current).unwrap_or_default();
        debug!(worker = %current, items = share.len(), "user pool share");
        Ok(share)
    }

    fn check_worker(&self, worker: &str) -> DispatchResult<()> {
        if self.contains(worker) {
            Ok(())
        } else {
            Err(DispatchError::Config(format!(
                "worker `{worker}` is not expected; allowed workers are {:?}",
                self.workers
            )))
        }
    }
}

impl Toggle for UserPool {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn pool() -> UserPool {
        UserPool::new(["carla", "ana", "bruno"]).unwrap()
    }

    #[test]
    fn test_workers_sorted_and_manager_is_first_listed() {
        let pool = pool();
        assert_eq!(pool.workers(), ["ana", "bruno", "carla"]);
        assert_eq!(pool.manager(), "carla");
        assert_eq!(pool.clients().collect::<Vec<_>>(), vec!["ana", "bruno"]);
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        assert!(matches!(UserPool::new(Vec::<String>::new()), Err(DispatchError::Config(_))));
    }

    #[test]
    fn test_current_must_be_a_worker() {
        let mut pool = pool();
        assert!(matches!(pool.set_current("mallory"), Err(DispatchError::Config(_))));

        pool.set_current("carla").unwrap();
        assert!(pool.is_manager());
        assert!(!pool.is_client());

        let pool = pool.with_server(Some("ana".to_string())).with_current("ana").unwrap();
        assert!(pool.is_server());
        assert!(pool.is_client());
    }

    #[test]
    fn test_get_iterable_shares() {
        let mut pool = pool().with_current("bruno").unwrap();
        assert_eq!(pool.get_iterable((0..10).collect()).unwrap(), vec![4, 5, 6]);

        let guard = pool.disabled();
        assert_eq!(guard.get_iterable(vec![1, 2]).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_get_iterable_requires_current() {
        assert!(matches!(pool().get_iterable(vec![1]), Err(DispatchError::Config(_))));
    }

    #[test]
    fn test_preassignment_outside_pool_fails() {
        let seeds: Assignment<String, u32> = [("mallory".to_string(), vec![1])].into_iter().collect();
        let err = pool().distribute(0..3, DistributeOptions::with_assignments(seeds)).unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }

    #[test]
    fn test_json_round_trip_with_custom_keys() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pool.json");
        let keys = UserPoolKeys { workers: "users".to_string(), ..UserPoolKeys::default() };

        std::fs::write(&path, r#"{"users": ["b", "a"], "manager": "b", "server": null}"#).unwrap();
        let pool = UserPool::from_json_with_keys(&path, keys).unwrap();
        assert_eq!(pool.workers(), ["a", "b"]);
        assert_eq!(pool.manager(), "b");
        assert_eq!(pool.server(), None);

        pool.to_json(&path).unwrap();
        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, serde_json::json!({"users": ["a", "b"], "manager": "b"}));
    }

    #[test]
    fn test_missing_pool_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(UserPool::from_json(&temp.path().join("nope.json")), Err(DispatchError::Store(_))));
    }
}
