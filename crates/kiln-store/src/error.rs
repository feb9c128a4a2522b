use std::path::PathBuf;
use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by persisted JSON documents.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document exists but is not valid JSON or has the wrong shape.
    #[error("document {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize document {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Whether lenient loading may replace the document with a fresh one.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Corrupt { .. } | Self::Io { .. })
    }
}
