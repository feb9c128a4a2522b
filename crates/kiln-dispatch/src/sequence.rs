//! File-backed sequence cursors.
//!
//! Every process iterating the same case through a shared directory claims
//! distinct indices until the sequence runs out. Claims are taken under the
//! case document's lock, one index at a time.

use crate::error::{DispatchError, DispatchResult};
use kiln_store::{KeyedDocuments, SerdeFormat, clear_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCursor {
    pub name: String,
    pub total_length: usize,
    pub current: usize,
}

impl SequenceCursor {
    fn start(name: &str, total_length: usize) -> Self {
        Self { name: name.to_string(), total_length, current: 0 }
    }
}

#[derive(Debug, Clone)]
pub struct SequenceDistributor {
    cases: KeyedDocuments<SerdeFormat<SequenceCursor>>,
}

impl SequenceDistributor {
    pub fn open(path: impl Into<PathBuf>, reset: bool) -> DispatchResult<Self> {
        let dir = path.into();
        if reset {
            clear_dir(&dir)?;
            info!(path = %dir.display(), "sequence cursors reset");
        }
        std::fs::create_dir_all(&dir)?;
        Ok(Self { cases: KeyedDocuments::new(dir, SerdeFormat::new()) })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.cases.dir()
    }

    /// The cursor for `case_name`, if the case was ever started.
    pub fn cursor(&self, case_name: &str) -> DispatchResult<Option<SequenceCursor>> {
        let doc = self.cases.document(case_name);
        if !doc.exists() {
            return Ok(None);
        }
        Ok(Some(doc.load(false)?))
    }

    /// Next unclaimed index of `case_name`, starting the case if needed.
    ///
    /// The stored length follows the caller's, so a case can be extended by
    /// claiming with a longer sequence.
    pub fn claim(&self, case_name: &str, total_length: usize) -> DispatchResult<Option<usize>> {
        let claimed = self.cases.document(case_name).update_or_init(
            false,
            || SequenceCursor::start(case_name, total_length),
            |cursor| {
                cursor.total_length = total_length;
                if cursor.current >= total_length {
                    return Ok::<_, DispatchError>(None);
                }
                let index = cursor.current;
                cursor.current += 1;
                Ok(Some(index))
            },
        )?;
        debug!(case = case_name, index = ?claimed, total_length, "sequence claim");
        Ok(claimed)
    }

    /// Iterate the items of `seq` this process claims for `case_name`.
    ///
    /// Stops at the end of the sequence or after the first error.
    pub fn iter<'a, T>(&'a self, case_name: &'a str, seq: &'a [T]) -> impl Iterator<Item = DispatchResult<&'a T>> + 'a {
        let mut done = false;
        std::iter::from_fn(move || {
            if done {
                return None;
            }
            match self.claim(case_name, seq.len()) {
                Ok(Some(index)) => seq.get(index).map(Ok),
                Ok(None) => {
                    done = true;
                    None
                }
                Err(err) => {
                    done = true;
                    Some(Err(err))
                }
            }
        })
    }

    /// Forget `case_name` so the next claim starts from zero.
    pub fn reset_case(&self, case_name: &str) -> DispatchResult<bool> {
        Ok(self.cases.remove(case_name)?)
    }

    pub fn cases(&self) -> DispatchResult<Vec<String>> {
        Ok(self.cases.keys()?)
    }
}
