//! Save/load codecs for artifact files.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why an artifact could not be loaded.
///
/// `NotFound` and `Unreadable` are expected cache misses; `Other` is a real
/// fault and is never swallowed.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("artifact file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("artifact file {} is unreadable: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoadError {
    #[must_use]
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Unreadable { .. })
    }
}

pub trait Codec<A> {
    fn save(&self, artifact: &A, path: &Path) -> anyhow::Result<()>;

    fn load(&self, path: &Path) -> Result<A, LoadError>;
}

/// Stores artifacts as pretty-printed JSON.
pub struct JsonCodec<A>(PhantomData<fn() -> A>);

impl<A> JsonCodec<A> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<A> Default for JsonCodec<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for JsonCodec<A> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<A> std::fmt::Debug for JsonCodec<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<A: Serialize + DeserializeOwned> Codec<A> for JsonCodec<A> {
    fn save(&self, artifact: &A, path: &Path) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(artifact)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<A, LoadError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoadError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(LoadError::Unreadable { path: path.to_path_buf(), reason: e.to_string() }),
        };

        serde_json::from_slice(&bytes)
            .map_err(|e| LoadError::Unreadable { path: path.to_path_buf(), reason: e.to_string() })
    }
}
