//! Kiln Store
//!
//! Crash-consistent JSON persistence shared by the artifact cache and the
//! work distributors:
//! - Whole-document atomic overwrites (`JsonDocument`)
//! - Lenient loading that reinitializes corrupt documents
//! - Advisory file locks around read-modify-write cycles (`FileLock`)
//! - Directories of per-key documents (`KeyedDocuments`)

pub mod document;
pub mod error;
pub mod keyed;
pub mod lock;

pub use document::{DocumentFormat, JsonDocument, SerdeFormat};
pub use error::{StoreError, StoreResult};
pub use keyed::{KeyedDocuments, clear_dir};
pub use lock::FileLock;
