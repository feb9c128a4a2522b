//! The lookup table: artifact id → entry, persisted as one JSON document.
//!
//! ```json
//! {
//!   "models": {
//!     "0.data": { "path": "0.data", "creator": "resnet", "parameters": { "depth": 50 } }
//!   }
//! }
//! ```
//!
//! Key names come from [`TableKeys`]. A missing entries section decodes as an
//! empty table; any other shape mismatch marks the document corrupt.

use crate::config::TableKeys;
use crate::content::Content;
use crate::error::CacheResult;
use kiln_store::{DocumentFormat, JsonDocument};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactId(pub String);

impl ArtifactId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Persisted metadata for one artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Artifact path relative to the lookup table's directory.
    pub path: String,
    pub content: Content,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupTable {
    entries: BTreeMap<String, Entry>,
}

impl LookupTable {
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, id: &ArtifactId, entry: Entry) -> Option<Entry> {
        self.entries.insert(id.0.clone(), entry)
    }

    pub fn remove(&mut self, id: &str) -> Option<Entry> {
        self.entries.remove(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(id, entry)| (id.as_str(), entry))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// JSON layout of the lookup table for a given set of key names.
#[derive(Debug, Clone, Default)]
pub struct TableFormat {
    keys: TableKeys,
}

impl TableFormat {
    #[must_use]
    pub fn new(keys: TableKeys) -> Self {
        Self { keys }
    }

    /// Content as it appears inside an entry (`{creator, description}`).
    #[must_use]
    pub fn encode_content(&self, content: &Content) -> Value {
        let mut map = Map::new();
        map.insert(self.keys.creator.clone(), Value::String(content.creator.clone()));
        map.insert(self.keys.description.clone(), content.description.clone());
        Value::Object(map)
    }

    fn decode_entry(&self, id: &str, value: Value) -> Result<Entry, String> {
        let Value::Object(mut map) = value else {
            return Err(format!("entry `{id}` is not an object"));
        };
        let path = match map.remove(&self.keys.path) {
            Some(Value::String(path)) => path,
            _ => return Err(format!("entry `{id}` has no string `{}`", self.keys.path)),
        };
        let creator = match map.remove(&self.keys.creator) {
            Some(Value::String(creator)) => creator,
            _ => return Err(format!("entry `{id}` has no string `{}`", self.keys.creator)),
        };
        let description = map
            .remove(&self.keys.description)
            .ok_or_else(|| format!("entry `{id}` has no `{}`", self.keys.description))?;

        Ok(Entry { path, content: Content { creator, description } })
    }
}

impl DocumentFormat for TableFormat {
    type Doc = LookupTable;

    fn empty(&self) -> LookupTable {
        LookupTable::default()
    }

    fn decode(&self, value: Value) -> Result<LookupTable, String> {
        let Value::Object(mut root) = value else {
            return Err("lookup table is not a JSON object".to_string());
        };

        let section = match root.remove(&self.keys.entries) {
            None => return Ok(LookupTable::default()),
            Some(Value::Object(section)) => section,
            Some(_) => return Err(format!("`{}` is not an object", self.keys.entries)),
        };

        let mut entries = BTreeMap::new();
        for (id, value) in section {
            let entry = self.decode_entry(&id, value)?;
            entries.insert(id, entry);
        }
        Ok(LookupTable { entries })
    }

    fn encode(&self, table: &LookupTable) -> Result<Value, serde_json::Error> {
        let mut section = Map::new();
        for (id, entry) in &table.entries {
            let mut encoded = Map::new();
            encoded.insert(self.keys.path.clone(), Value::String(entry.path.clone()));
            if let Value::Object(content) = self.encode_content(&entry.content) {
                encoded.extend(content);
            }
            section.insert(id.clone(), Value::Object(encoded));
        }

        let mut root = Map::new();
        root.insert(self.keys.entries.clone(), Value::Object(section));
        Ok(Value::Object(root))
    }
}

/// Lookup table persistence on a single path.
///
/// The store never saves on its own; owners call [`LookupStore::save`] or run
/// a locked [`LookupStore::update`] at their flush points.
#[derive(Debug, Clone)]
pub struct LookupStore {
    doc: JsonDocument<TableFormat>,
    strict: bool,
}

impl LookupStore {
    pub fn new(path: &Path, keys: TableKeys, strict: bool) -> Self {
        Self { doc: JsonDocument::new(path, TableFormat::new(keys)), strict }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.doc.path()
    }

    #[must_use]
    pub fn format(&self) -> &TableFormat {
        self.doc.format()
    }

    /// Load the table, reinitializing it unless the store is strict.
    pub fn load(&self) -> CacheResult<LookupTable> {
        Ok(self.doc.load(self.strict)?)
    }

    /// Load with an explicit strictness, overriding the configured one.
    pub fn load_with(&self, strict: bool) -> CacheResult<LookupTable> {
        Ok(self.doc.load(strict)?)
    }

    /// Overwrite the whole table.
    pub fn save(&self, table: &LookupTable) -> CacheResult<()> {
        let _lock = self.doc.lock()?;
        Ok(self.doc.write(table)?)
    }

    /// Read-modify-write under the table lock; saved only if `f` succeeds.
    pub fn update<R>(&self, f: impl FnOnce(&mut LookupTable) -> CacheResult<R>) -> CacheResult<R> {
        self.doc.update(self.strict, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(path: &str, creator: &str, description: Value) -> Entry {
        Entry { path: path.to_string(), content: Content::new(creator, description) }
    }

    #[test]
    fn test_encode_uses_configured_keys() {
        let format = TableFormat::new(TableKeys::default());
        let mut table = LookupTable::default();
        table.insert(&ArtifactId("0.data".to_string()), entry("0.data", "resnet", json!({"depth": 50})));

        let value = format.encode(&table).unwrap();
        assert_eq!(
            value,
            json!({"models": {"0.data": {"path": "0.data", "creator": "resnet", "parameters": {"depth": 50}}}})
        );
        assert_eq!(format.decode(value).unwrap(), table);
    }

    #[test]
    fn test_missing_section_decodes_empty() {
        let format = TableFormat::default();
        let table = format.decode(json!({"other": 1})).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_malformed_entries_are_corrupt() {
        let format = TableFormat::default();
        assert!(format.decode(json!([])).is_err());
        assert!(format.decode(json!({"models": []})).is_err());
        assert!(format.decode(json!({"models": {"0.data": {"creator": "c", "parameters": {}}}})).is_err());
        assert!(format.decode(json!({"models": {"0.data": {"path": "p", "creator": 1, "parameters": {}}}})).is_err());
        assert!(format.decode(json!({"models": {"0.data": {"path": "p", "creator": "c"}}})).is_err());
    }

    #[test]
    fn test_store_recovers_truncated_table() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lookup_table.json");
        std::fs::write(&path, "{\"models\": {\"0.data\": {\"pa").unwrap();

        let store = LookupStore::new(&path, TableKeys::default(), false);
        let table = store.load().unwrap();

        assert!(table.is_empty());
        let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({"models": {}}));
    }

    #[test]
    fn test_strict_store_surfaces_corruption() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lookup_table.json");
        std::fs::write(&path, "garbage").unwrap();

        let store = LookupStore::new(&path, TableKeys::default(), true);
        assert!(store.load().is_err());
        assert!(store.load_with(false).unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let store = LookupStore::new(&temp.path().join("t.json"), TableKeys::default(), false);

        let mut table = LookupTable::default();
        table.insert(&ArtifactId("3.data".to_string()), entry("3.data", "c", json!(null)));
        store.save(&table).unwrap();

        assert_eq!(store.load().unwrap(), table);
    }
}
