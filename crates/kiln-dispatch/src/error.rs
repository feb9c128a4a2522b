use kiln_store::StoreError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Ticket pool, cursor or ledger persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid distribution setup: {0}")]
    Config(String),

    #[error("no tickets left in the pool")]
    EmptyPool,

    /// The ticket service answered with a non-success status or an
    /// unusable body. Never retried.
    #[error(
        "ticket service at {url} failed{}: {message}",
        status.map(|s| format!(" with status {s}")).unwrap_or_default()
    )]
    RemoteFailure { url: String, status: Option<u16>, message: String },

    #[error("ticket service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("no service url appeared at {} after {:?}", path.display(), waited)]
    UrlFileTimeout { path: PathBuf, waited: Duration },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
