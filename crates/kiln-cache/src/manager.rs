//! Lookup-or-create-or-load for cached artifacts.
//!
//! Identity allocation is eager and durable: asking for an artifact path (or
//! providing an artifact) registers its entry in the lookup table right away,
//! whether or not the artifact file is ever written. Materialization is lazy:
//! the creator only runs when no loadable artifact exists.

use crate::codec::{Codec, JsonCodec, LoadError};
use crate::config::CacheConfig;
use crate::content::{Content, Creator, Stamp};
use crate::error::{CacheError, CacheResult};
use crate::paths::relative_path;
use crate::resolver::IdentityResolver;
use crate::table::{ArtifactId, Entry, LookupStore, LookupTable};
use crate::template::IdTemplate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// How [`ArtifactManager::artifact_path`] resolves and reports a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathQuery {
    /// Register the entry in the lookup table and flush it.
    pub include: bool,
    /// Allocate a new id when no entry matches instead of failing.
    pub missing_ok: bool,
    /// Return the absolute path rather than the table-relative one.
    pub full: bool,
}

impl PathQuery {
    /// Find or allocate, register, and return the absolute path.
    #[must_use]
    pub const fn register() -> Self {
        Self { include: true, missing_ok: true, full: true }
    }

    /// Only resolve an existing entry; nothing is written.
    #[must_use]
    pub const fn lookup() -> Self {
        Self { include: false, missing_ok: false, full: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvideOptions {
    /// Persist a freshly created artifact with the codec.
    pub save: bool,
    /// Try the codec before running the creator.
    pub load: bool,
    /// Surface cache misses from the codec instead of recreating.
    pub raise_if_load_fails: bool,
}

impl ProvideOptions {
    /// Load when possible, otherwise create and save.
    #[must_use]
    pub fn cached() -> Self {
        Self { save: true, load: true, ..Self::default() }
    }
}

pub struct ArtifactManager<A, C = JsonCodec<A>> {
    models_dir: PathBuf,
    store: LookupStore,
    resolver: IdentityResolver,
    codec: C,
    _artifact: PhantomData<fn() -> A>,
}

impl<A> ArtifactManager<A, JsonCodec<A>>
where
    A: Serialize + DeserializeOwned,
{
    /// A manager storing artifacts as JSON.
    pub fn open(config: &CacheConfig) -> CacheResult<Self> {
        Self::with_codec(config, JsonCodec::new())
    }
}

impl<A, C: Codec<A>> ArtifactManager<A, C> {
    pub fn with_codec(config: &CacheConfig, codec: C) -> CacheResult<Self> {
        let template = IdTemplate::new(&config.id_template, &config.index_key)?;
        let models_dir = config.resolved_models_dir()?;
        let table_path = config.resolved_table_path()?;

        let manager = Self {
            models_dir,
            store: LookupStore::new(&table_path, config.keys.clone(), config.strict),
            resolver: IdentityResolver::new(template),
            codec,
            _artifact: PhantomData,
        };

        if config.load_table {
            let table = manager.store.load()?;
            debug!(
                path = %manager.table_path().display(),
                entries = table.len(),
                "lookup table loaded"
            );
        }

        Ok(manager)
    }

    #[must_use]
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    #[must_use]
    pub fn table_path(&self) -> &Path {
        self.store.path()
    }

    #[must_use]
    pub fn codec(&self) -> &C {
        &self.codec
    }

    #[must_use]
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Current lookup table as persisted.
    pub fn table(&self) -> CacheResult<LookupTable> {
        self.store.load()
    }

    /// Reload the table with an explicit strictness.
    pub fn reload(&self, strict: bool) -> CacheResult<LookupTable> {
        self.store.load_with(strict)
    }

    pub fn entries(&self) -> CacheResult<BTreeMap<ArtifactId, Entry>> {
        Ok(self.table()?.iter().map(|(id, entry)| (ArtifactId(id.to_string()), entry.clone())).collect())
    }

    pub fn ids(&self) -> CacheResult<Vec<ArtifactId>> {
        Ok(self.table()?.ids().map(|id| ArtifactId(id.to_string())).collect())
    }

    pub fn contents(&self) -> CacheResult<BTreeMap<ArtifactId, Content>> {
        Ok(self
            .table()?
            .iter()
            .map(|(id, entry)| (ArtifactId(id.to_string()), entry.content.clone()))
            .collect())
    }

    pub fn entry(&self, id: &ArtifactId) -> CacheResult<Option<Entry>> {
        Ok(self.table()?.get(id.as_str()).cloned())
    }

    pub fn find(&self, content: &Content) -> CacheResult<Option<ArtifactId>> {
        self.resolver.find(&self.table()?, content)
    }

    /// Resolve without registering anything.
    pub fn resolve(&self, content: &Content, missing_ok: bool) -> CacheResult<ArtifactId> {
        self.resolver.resolve(&self.table()?, content, missing_ok)
    }

    pub fn has(&self, content: &Content) -> CacheResult<bool> {
        Ok(self.find(content)?.is_some())
    }

    pub fn artifact_path(&self, content: &Content, query: PathQuery) -> CacheResult<PathBuf> {
        let id = if query.include {
            self.store.update(|table| {
                let id = self.resolver.resolve(table, content, query.missing_ok)?;
                let entry = Entry { path: self.relative_path_for(&id), content: content.clone() };
                if table.insert(&id, entry).is_none() {
                    info!(id = %id, creator = %content.creator, "registered artifact");
                }
                Ok(id)
            })?
        } else {
            self.resolve(content, query.missing_ok)?
        };

        let path = if query.full {
            self.models_dir.join(id.as_str())
        } else {
            PathBuf::from(self.relative_path_for(&id))
        };
        debug!(id = %id, path = %path.display(), "artifact path");
        Ok(path)
    }

    pub fn save_artifact(&self, artifact: &A, path: &Path) -> CacheResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.codec
            .save(artifact, path)
            .map_err(|source| CacheError::SaveFailed { path: path.to_path_buf(), source })?;
        info!(path = %path.display(), "artifact saved");
        Ok(())
    }

    pub fn load_artifact(&self, path: &Path) -> Result<A, LoadError> {
        self.codec.load(path)
    }

    /// Load the artifact for `content` if it was registered before.
    ///
    /// Returns `None` without touching the table when no entry matches, and
    /// `None` on a cache miss from the codec unless `raise_if_load_fails`.
    pub fn retrieve(&self, content: &Content, raise_if_load_fails: bool) -> CacheResult<Option<A>> {
        let Some(id) = self.find(content)? else {
            debug!(creator = %content.creator, "no entry to retrieve");
            return Ok(None);
        };
        self.try_load(&self.models_dir.join(id.as_str()), raise_if_load_fails)
    }

    /// Provide the artifact `creator` makes for `description`.
    pub fn provide(
        &self,
        creator: &dyn Creator<A>,
        description: Value,
        params: &Value,
        options: &ProvideOptions,
    ) -> CacheResult<A> {
        let content = Content::for_creator(creator, description);
        self.provide_content(&content, creator, params, options)
    }

    /// Like [`ArtifactManager::provide`] with an explicit content, e.g. to
    /// record a creator name different from [`Creator::describe`].
    pub fn provide_content(
        &self,
        content: &Content,
        creator: &dyn Creator<A>,
        params: &Value,
        options: &ProvideOptions,
    ) -> CacheResult<A> {
        self.provide_with(content, creator, params, options, |_| Ok(()))
    }

    /// Like [`ArtifactManager::provide`], stamping freshly created artifacts
    /// with their content under `content_key`.
    pub fn provide_stamped(
        &self,
        creator: &dyn Creator<A>,
        description: Value,
        params: &Value,
        options: &ProvideOptions,
        content_key: &str,
    ) -> CacheResult<A>
    where
        A: Stamp,
    {
        let content = Content::for_creator(creator, description);
        self.provide_content_stamped(&content, creator, params, options, content_key)
    }

    pub fn provide_content_stamped(
        &self,
        content: &Content,
        creator: &dyn Creator<A>,
        params: &Value,
        options: &ProvideOptions,
        content_key: &str,
    ) -> CacheResult<A>
    where
        A: Stamp,
    {
        let encoded = self.store.format().encode_content(content);
        self.provide_with(content, creator, params, options, |artifact| artifact.stamp(content_key, &encoded))
    }

    /// Registration, optional load, then create, `finish` and save.
    fn provide_with(
        &self,
        content: &Content,
        creator: &dyn Creator<A>,
        params: &Value,
        options: &ProvideOptions,
        finish: impl FnOnce(&mut A) -> CacheResult<()>,
    ) -> CacheResult<A> {
        debug!(
            creator = %content.creator,
            description = %content.description,
            params = %params,
            "providing artifact"
        );

        let path = self.artifact_path(content, PathQuery::register())?;

        if options.load
            && let Some(artifact) = self.try_load(&path, options.raise_if_load_fails)?
        {
            return Ok(artifact);
        }

        let mut artifact = creator
            .create(params)
            .map_err(|source| CacheError::Creator { creator: content.creator.clone(), source })?;
        info!(creator = %content.creator, path = %path.display(), "artifact created");
        finish(&mut artifact)?;

        if options.save {
            self.save_artifact(&artifact, &path)?;
        }

        Ok(artifact)
    }

    fn try_load(&self, path: &Path, raise_if_load_fails: bool) -> CacheResult<Option<A>> {
        debug!(path = %path.display(), "trying to load artifact");
        match self.codec.load(path) {
            Ok(artifact) => Ok(Some(artifact)),
            Err(source) if source.is_cache_miss() && !raise_if_load_fails => {
                debug!(path = %path.display(), reason = %source, "artifact load failed");
                Ok(None)
            }
            Err(source) => Err(CacheError::LoadFailed { path: path.to_path_buf(), source }),
        }
    }

    fn relative_path_for(&self, id: &ArtifactId) -> String {
        let full = self.models_dir.join(id.as_str());
        let base = self.table_path().parent().unwrap_or_else(|| Path::new("/"));
        relative_path(base, &full).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::FnCreator;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn manager(temp: &TempDir) -> ArtifactManager<Value> {
        ArtifactManager::open(&CacheConfig::new(temp.path())).unwrap()
    }

    #[test]
    fn test_open_creates_table() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        assert!(manager.table_path().exists());
        assert!(manager.ids().unwrap().is_empty());
    }

    #[test]
    fn test_open_rejects_bad_template() {
        let temp = TempDir::new().unwrap();
        let config = CacheConfig { id_template: "fixed.data".to_string(), ..CacheConfig::new(temp.path()) };
        assert!(matches!(ArtifactManager::<Value>::open(&config), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_relative_path_query() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let content = Content::new("net", json!({"a": 1}));

        let query = PathQuery { include: true, missing_ok: true, full: false };
        assert_eq!(manager.artifact_path(&content, query).unwrap(), PathBuf::from("0.data"));

        let entry = manager.entry(&ArtifactId("0.data".to_string())).unwrap().unwrap();
        assert_eq!(entry.path, "0.data");
    }

    #[test]
    fn test_lookup_query_does_not_register() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let content = Content::new("net", json!({"a": 1}));

        assert!(matches!(manager.artifact_path(&content, PathQuery::lookup()), Err(CacheError::NotFound(_))));
        let query = PathQuery { include: false, missing_ok: true, full: true };
        assert_eq!(manager.artifact_path(&content, query).unwrap(), manager.models_dir().join("0.data"));
        assert!(manager.ids().unwrap().is_empty());
    }

    #[test]
    fn test_creator_failure_keeps_registration() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let failing = FnCreator::new("broken", |_: &Value| -> anyhow::Result<Value> { anyhow::bail!("no gpu") });

        let err = manager.provide(&failing, json!({"a": 1}), &json!({}), &ProvideOptions::default()).unwrap_err();
        assert!(matches!(err, CacheError::Creator { .. }));
        assert!(manager.has(&Content::new("broken", json!({"a": 1}))).unwrap());
    }
}
