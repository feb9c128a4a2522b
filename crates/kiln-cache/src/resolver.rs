//! Mapping contents to artifact ids.

use crate::content::Content;
use crate::error::{CacheError, CacheResult};
use crate::table::{ArtifactId, LookupTable};
use crate::template::IdTemplate;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct IdentityResolver {
    template: IdTemplate,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(template: IdTemplate) -> Self {
        Self { template }
    }

    #[must_use]
    pub fn template(&self) -> &IdTemplate {
        &self.template
    }

    /// Indices of all ids that follow the template. Others are ignored.
    pub fn indices<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> BTreeSet<u64> {
        ids.into_iter().filter_map(|id| self.template.parse_index(id)).collect()
    }

    /// A fresh id: the smallest gap below the largest index, else the next
    /// index after it (`0` for an empty table).
    #[must_use]
    pub fn next_id(&self, table: &LookupTable) -> ArtifactId {
        let indices = self.indices(table.ids());
        ArtifactId(self.template.format(next_index(&indices)))
    }

    /// The id whose entry content is equivalent to `content`, if any.
    pub fn find(&self, table: &LookupTable, content: &Content) -> CacheResult<Option<ArtifactId>> {
        let mut matches = table
            .iter()
            .filter(|(_, entry)| entry.content.is_equivalent(content))
            .map(|(id, _)| id.to_string());

        let Some(first) = matches.next() else {
            return Ok(None);
        };
        let rest: Vec<String> = matches.collect();
        if !rest.is_empty() {
            let mut ids = vec![first];
            ids.extend(rest);
            return Err(CacheError::AmbiguousMatch { content: describe(content), ids });
        }
        Ok(Some(ArtifactId(first)))
    }

    /// Find the id for `content`, allocating a new one when `missing_ok`.
    ///
    /// Allocation does not touch the table; registering the id is up to the
    /// caller, so resolving twice without a save yields the same id.
    pub fn resolve(&self, table: &LookupTable, content: &Content, missing_ok: bool) -> CacheResult<ArtifactId> {
        match self.find(table, content)? {
            Some(id) => Ok(id),
            None if missing_ok => Ok(self.next_id(table)),
            None => Err(CacheError::NotFound(describe(content))),
        }
    }
}

/// Indices missing from `0..max`, ascending.
///
/// Lazy: only the gaps between neighbouring indices are walked.
pub fn missing_indices(indices: &BTreeSet<u64>) -> impl Iterator<Item = u64> + '_ {
    let mut expected = 0;
    indices.iter().flat_map(move |&index| {
        let gap = expected..index;
        expected = index.saturating_add(1);
        gap
    })
}

fn next_index(indices: &BTreeSet<u64>) -> u64 {
    // The i-th smallest index differs from i exactly at the first gap.
    (0..)
        .zip(indices)
        .find(|(position, index)| position != *index)
        .map_or_else(|| indices.last().map_or(0, |max| max.saturating_add(1)), |(position, _)| position)
}

fn describe(content: &Content) -> String {
    serde_json::to_string(content).unwrap_or_else(|_| format!("{content:?}"))
}
