use crate::codec::LoadError;
use kiln_store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Lookup table I/O or corruption (only surfaced in strict mode).
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no artifact matches content: {0}")]
    NotFound(String),

    #[error("{} artifacts match content {content}: {}", ids.len(), ids.join(", "))]
    AmbiguousMatch { content: String, ids: Vec<String> },

    #[error("failed to load artifact at {}: {source}", path.display())]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: LoadError,
    },

    #[error("failed to save artifact at {}: {source}", path.display())]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("creator `{creator}` failed: {source}")]
    Creator {
        creator: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot stamp artifact: {0}")]
    Stamp(String),

    #[error("invalid cache configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
