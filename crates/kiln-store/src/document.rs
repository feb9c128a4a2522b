//! Single JSON documents persisted with atomic overwrites.
//!
//! Every write goes to a temporary file in the target directory which is then
//! renamed over the document, so readers never observe a partial write.
//! Read-modify-write cycles ([`JsonDocument::update`]) additionally hold an
//! exclusive advisory lock on a `<file>.lock` sidecar, which makes them safe
//! across processes sharing the same directory.

use crate::error::{StoreError, StoreResult};
use crate::lock::FileLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How a document type maps to and from its JSON representation.
pub trait DocumentFormat {
    type Doc;

    /// The document written when the file is missing or unreadable.
    fn empty(&self) -> Self::Doc;

    /// Convert parsed JSON into a document; `Err` marks the file as corrupt.
    fn decode(&self, value: Value) -> Result<Self::Doc, String>;

    fn encode(&self, doc: &Self::Doc) -> Result<Value, serde_json::Error>;
}

/// Format for any `serde` type with a sensible empty value.
pub struct SerdeFormat<T>(PhantomData<fn() -> T>);

impl<T> SerdeFormat<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for SerdeFormat<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SerdeFormat<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SerdeFormat<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SerdeFormat")
    }
}

impl<T> DocumentFormat for SerdeFormat<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    type Doc = T;

    fn empty(&self) -> T {
        T::default()
    }

    fn decode(&self, value: Value) -> Result<T, String> {
        serde_json::from_value(value).map_err(|e| e.to_string())
    }

    fn encode(&self, doc: &T) -> Result<Value, serde_json::Error> {
        serde_json::to_value(doc)
    }
}

/// A JSON document stored at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonDocument<F> {
    path: PathBuf,
    lock_path: PathBuf,
    format: F,
}

impl<T> JsonDocument<SerdeFormat<T>>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// A document holding a plain `serde` type.
    pub fn serde(path: impl Into<PathBuf>) -> Self {
        Self::new(path, SerdeFormat::new())
    }
}

impl<F: DocumentFormat> JsonDocument<F> {
    pub fn new(path: impl Into<PathBuf>, format: F) -> Self {
        let path = path.into();
        let mut lock_name = path.file_name().map_or_else(OsString::new, ToOwned::to_owned);
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self { path, lock_path, format }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn format(&self) -> &F {
        &self.format
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Take the exclusive lock guarding this document.
    pub fn lock(&self) -> StoreResult<FileLock> {
        FileLock::exclusive(&self.lock_path)
    }

    /// Read and decode the document without any recovery.
    pub fn read(&self) -> StoreResult<F::Doc> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
        let value: Value = serde_json::from_str(&contents)
            .map_err(|e| StoreError::Corrupt { path: self.path.clone(), reason: e.to_string() })?;
        self.format
            .decode(value)
            .map_err(|reason| StoreError::Corrupt { path: self.path.clone(), reason })
    }

    /// Overwrite the whole document, creating parent directories as needed.
    pub fn write(&self, doc: &F::Doc) -> StoreResult<()> {
        let serialize_err = |source| StoreError::Serialize { path: self.path.clone(), source };
        let value = self.format.encode(doc).map_err(serialize_err)?;
        let mut json = serde_json::to_string_pretty(&value).map_err(serialize_err)?;
        json.push('\n');

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|e| StoreError::io(&parent, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| StoreError::io(&parent, e))?;
        tmp.write_all(json.as_bytes()).map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&self.path).map_err(|e| StoreError::io(&self.path, e.error))?;

        debug!(path = %self.path.display(), "document written");
        Ok(())
    }

    /// Load the document, initializing it with the format's empty value when
    /// missing. See [`JsonDocument::load_or_init`] for the recovery rules.
    pub fn load(&self, strict: bool) -> StoreResult<F::Doc> {
        self.load_or_init(strict, || self.format.empty())
    }

    /// Load the document under its lock.
    ///
    /// A missing file is initialized with `init` and persisted. An unreadable
    /// or malformed file is an error in strict mode; otherwise it is replaced
    /// by `init`, persisted, and read back once. If that read also fails the
    /// freshly initialized value is returned.
    pub fn load_or_init(&self, strict: bool, init: impl Fn() -> F::Doc) -> StoreResult<F::Doc> {
        let _lock = self.lock()?;
        self.load_locked(strict, &init)
    }

    /// Run a read-modify-write cycle under the document lock.
    ///
    /// The document is written back only when `f` succeeds.
    pub fn update<R, E>(&self, strict: bool, f: impl FnOnce(&mut F::Doc) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        self.update_or_init(strict, || self.format.empty(), f)
    }

    /// Like [`JsonDocument::update`], seeding a missing document with `init`.
    pub fn update_or_init<R, E>(
        &self,
        strict: bool,
        init: impl Fn() -> F::Doc,
        f: impl FnOnce(&mut F::Doc) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let _lock = self.lock()?;
        let mut doc = self.load_locked(strict, &init)?;
        let out = f(&mut doc)?;
        self.write(&doc)?;
        Ok(out)
    }

    /// Replace the document with the format's empty value.
    pub fn reset(&self) -> StoreResult<F::Doc> {
        let _lock = self.lock()?;
        let doc = self.format.empty();
        self.write(&doc)?;
        Ok(doc)
    }

    fn load_locked(&self, strict: bool, init: &dyn Fn() -> F::Doc) -> StoreResult<F::Doc> {
        if !self.exists() {
            debug!(path = %self.path.display(), "document missing, initializing");
            self.write(&init())?;
        }

        match self.read() {
            Ok(doc) => Ok(doc),
            Err(err) if strict || !err.is_recoverable() => Err(err),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "document unreadable, reinitializing");
                let fresh = init();
                self.write(&fresh)?;
                match self.read() {
                    Ok(doc) => Ok(doc),
                    Err(err) => {
                        warn!(path = %self.path.display(), error = %err, "reinitialized document still unreadable");
                        Ok(fresh)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        next: u32,
        #[serde(default)]
        names: Vec<String>,
    }

    #[test]
    fn test_load_initializes_missing_document() {
        let temp = TempDir::new().unwrap();
        let doc = JsonDocument::<SerdeFormat<Counter>>::serde(temp.path().join("a").join("counter.json"));

        let loaded = doc.load(false).unwrap();
        assert_eq!(loaded, Counter::default());
        assert!(doc.exists());
    }

    #[test]
    fn test_load_recovers_corrupt_document() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("counter.json");
        std::fs::write(&path, "{\"next\": 3,").unwrap();

        let doc = JsonDocument::<SerdeFormat<Counter>>::serde(&path);
        let loaded = doc.load(false).unwrap();

        assert_eq!(loaded, Counter::default());
        let on_disk: Counter = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, Counter::default());
    }

    #[test]
    fn test_strict_load_surfaces_corruption() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("counter.json");
        std::fs::write(&path, "not json").unwrap();

        let doc = JsonDocument::<SerdeFormat<Counter>>::serde(&path);
        let err = doc.load(true).unwrap_err();

        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");
    }

    #[test]
    fn test_wrong_shape_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("counter.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let doc = JsonDocument::<SerdeFormat<Counter>>::serde(&path);
        assert!(matches!(doc.read(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_update_persists_only_on_success() {
        let temp = TempDir::new().unwrap();
        let doc = JsonDocument::<SerdeFormat<Counter>>::serde(temp.path().join("counter.json"));

        let next = doc
            .update(false, |c| {
                c.next += 1;
                c.names.push("first".to_string());
                Ok::<_, StoreError>(c.next)
            })
            .unwrap();
        assert_eq!(next, 1);

        let failed: Result<(), StoreError> = doc.update(false, |c| {
            c.next = 99;
            Err(StoreError::Corrupt { path: PathBuf::from("x"), reason: "abort".to_string() })
        });
        assert!(failed.is_err());

        let loaded = doc.read().unwrap();
        assert_eq!(loaded, Counter { next: 1, names: vec!["first".to_string()] });
    }

    #[test]
    fn test_lock_path_is_sidecar() {
        let doc = JsonDocument::<SerdeFormat<Counter>>::serde("/tmp/pool/users.json");
        assert_eq!(doc.lock_path, PathBuf::from("/tmp/pool/users.json.lock"));
    }

    #[test]
    fn test_load_or_init_uses_initializer() {
        let temp = TempDir::new().unwrap();
        let doc = JsonDocument::<SerdeFormat<Counter>>::serde(temp.path().join("counter.json"));

        let loaded = doc.load_or_init(false, || Counter { next: 7, names: Vec::new() }).unwrap();
        assert_eq!(loaded.next, 7);

        // Existing documents are not re-initialized.
        let again = doc.load_or_init(false, || Counter { next: 100, names: Vec::new() }).unwrap();
        assert_eq!(again.next, 7);
    }

    #[test]
    fn test_update_or_init_seeds_missing_document() {
        let temp = TempDir::new().unwrap();
        let doc = JsonDocument::<SerdeFormat<Counter>>::serde(temp.path().join("counter.json"));
        let seed = || Counter { next: 10, names: Vec::new() };

        let first =
            doc.update_or_init(false, seed, |c| Ok::<_, StoreError>(std::mem::replace(&mut c.next, 11))).unwrap();
        let second = doc.update_or_init(false, seed, |c| Ok::<_, StoreError>(c.next)).unwrap();

        assert_eq!((first, second), (10, 11));
    }
}
