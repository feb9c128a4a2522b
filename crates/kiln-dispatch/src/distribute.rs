//! Fair partitioning of items across an ordered set of workers.
//!
//! Without preassignment, items are split into contiguous chunks whose sizes
//! differ by at most one, in key order. With preassignment, the seeded
//! buckets are topped up one item at a time, shortest bucket first (ties by
//! key order), so the final sizes come out as level as the seeds allow.

use crate::error::{DispatchError, DispatchResult};
use indexmap::IndexMap;
use std::fmt;
use std::hash::Hash;

/// Worker key → items assigned to it, in key order.
pub type Assignment<K, T> = IndexMap<K, Vec<T>>;

type KeyPredicate<'a, K> = Box<dyn Fn(&K) -> bool + 'a>;

/// Preassignment overrides for [`distribute`].
pub struct DistributeOptions<'a, K, T> {
    /// Items already assigned per key. Keys not in the key list are kept and
    /// join the leveling after the listed keys.
    pub assignments: Option<Assignment<K, T>>,
    /// Keys eligible for `assign_items`. Must come with `assign_items`.
    pub assign_pred: Option<KeyPredicate<'a, K>>,
    /// Items distributed across the keys matching `assign_pred` before the
    /// main items. Must come with `assign_pred`.
    pub assign_items: Option<Vec<T>>,
}

impl<K, T> Default for DistributeOptions<'_, K, T> {
    fn default() -> Self {
        Self { assignments: None, assign_pred: None, assign_items: None }
    }
}

impl<K: fmt::Debug, T: fmt::Debug> fmt::Debug for DistributeOptions<'_, K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributeOptions")
            .field("assignments", &self.assignments)
            .field("assign_pred", &self.assign_pred.as_ref().map(|_| "<fn>"))
            .field("assign_items", &self.assign_items)
            .finish()
    }
}

impl<'a, K, T> DistributeOptions<'a, K, T> {
    #[must_use]
    pub fn with_assignments(assignments: Assignment<K, T>) -> Self {
        Self { assignments: Some(assignments), ..Self::default() }
    }

    /// Spread `items` over the keys matching `pred` first.
    #[must_use]
    pub fn with_partial(pred: impl Fn(&K) -> bool + 'a, items: Vec<T>) -> Self {
        Self { assign_pred: Some(Box::new(pred)), assign_items: Some(items), ..Self::default() }
    }

    /// Keys named by the preassignment, if any.
    pub fn assigned_keys(&self) -> impl Iterator<Item = &K> {
        self.assignments.iter().flat_map(IndexMap::keys)
    }
}

/// Partition `items` across `keys`.
///
/// Fails with [`DispatchError::Config`] when only one of `assign_pred` and
/// `assign_items` is given, or when there are items but nowhere to put them.
pub fn distribute<K, T>(
    keys: &[K],
    items: impl IntoIterator<Item = T>,
    options: DistributeOptions<'_, K, T>,
) -> DispatchResult<Assignment<K, T>>
where
    K: Clone + Eq + Hash,
{
    let DistributeOptions { assignments, assign_pred, assign_items } = options;

    let assignments = match (assign_pred, assign_items) {
        (None, None) => assignments,
        (Some(pred), Some(partial)) => {
            let eligible: Vec<K> = keys.iter().filter(|key| pred(*key)).cloned().collect();
            let seeded = DistributeOptions { assignments, ..DistributeOptions::default() };
            Some(distribute(&eligible, partial, seeded)?)
        }
        _ => {
            return Err(DispatchError::Config(
                "assign_pred and assign_items must be given together".to_string(),
            ));
        }
    };

    match assignments {
        None => chunks(keys, items.into_iter().collect()),
        Some(seeds) => top_up(keys, seeds, items),
    }
}

fn chunks<K: Clone + Eq + Hash, T>(keys: &[K], items: Vec<T>) -> DispatchResult<Assignment<K, T>> {
    if keys.is_empty() {
        return if items.is_empty() { Ok(IndexMap::new()) } else { Err(no_keys(items.len())) };
    }

    let base = items.len() / keys.len();
    let extra = items.len() % keys.len();

    let mut items = items.into_iter();
    let mut out = IndexMap::with_capacity(keys.len());
    for (n, key) in keys.iter().enumerate() {
        let size = base + usize::from(n < extra);
        out.insert(key.clone(), items.by_ref().take(size).collect());
    }
    Ok(out)
}

fn top_up<K: Clone + Eq + Hash, T>(
    keys: &[K],
    seeds: Assignment<K, T>,
    items: impl IntoIterator<Item = T>,
) -> DispatchResult<Assignment<K, T>> {
    let mut buckets: Assignment<K, T> = keys.iter().map(|key| (key.clone(), Vec::new())).collect();
    for (key, seeded) in seeds {
        buckets.insert(key, seeded);
    }

    // Stable: equal lengths keep key order.
    let mut order: Vec<usize> = (0..buckets.len()).collect();
    order.sort_by_key(|&i| buckets[i].len());

    let items = items.into_iter();
    let Some(&shortest) = order.first() else {
        let count = items.count();
        return if count == 0 { Ok(buckets) } else { Err(no_keys(count)) };
    };

    let n = order.len();
    let mut level = buckets[shortest].len();
    let mut pos = 0;
    for item in items {
        buckets[order[pos]].push(item);
        pos += 1;
        if pos == n || buckets[order[pos]].len() > level {
            level += 1;
            pos = 0;
        }
    }
    Ok(buckets)
}

fn no_keys(items: usize) -> DispatchError {
    DispatchError::Config(format!("cannot distribute {items} items over no workers"))
}
