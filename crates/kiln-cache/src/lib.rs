//! Kiln Cache
//!
//! Content-addressed artifact cache for experiment outputs:
//! - A JSON lookup table mapping artifact ids to `(path, creator, description)`
//! - Id allocation from a template such as `{index}.data`, reusing the lowest free slot
//! - Lookup-or-create-or-load through a `Creator` and a save/load `Codec`
//!
//! ```no_run
//! use kiln_cache::{ArtifactManager, CacheConfig, FnCreator, ProvideOptions};
//! use serde_json::{Value, json};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ArtifactManager::<Value>::open(&CacheConfig::new("experiments"))?;
//! let creator = FnCreator::new("linear", |params: &Value| -> anyhow::Result<Value> {
//!     Ok(json!({"weights": params["width"]}))
//! });
//!
//! let model = manager.provide(&creator, json!({"width": 8}), &json!({"width": 8}), &ProvideOptions::cached())?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod content;
pub mod error;
pub mod manager;
pub mod paths;
pub mod resolver;
pub mod table;
pub mod template;

pub use codec::{Codec, JsonCodec, LoadError};
pub use config::{CacheConfig, TableKeys};
pub use content::{Content, Creator, FnCreator, Stamp, json_equivalent};
pub use error::{CacheError, CacheResult};
pub use manager::{ArtifactManager, PathQuery, ProvideOptions};
pub use resolver::{IdentityResolver, missing_indices};
pub use table::{ArtifactId, Entry, LookupStore, LookupTable, TableFormat};
pub use template::IdTemplate;
