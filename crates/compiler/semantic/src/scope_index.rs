//! # Scope Locator
//!
//! Maps source offsets to the innermost scope covering them. Scopes are
//! indexed by `(start, length)` with starts ascending and, for equal starts,
//! lengths descending, so a backward scan from the query offset meets inner
//! scopes before the outer scopes that contain them.

use std::collections::BTreeMap;
use std::ops::Bound::{Included, Unbounded};

use crate::scope::ScopeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexKey {
    start: usize,
    len: usize,
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Starts ascending, lengths descending
        self.start
            .cmp(&other.start)
            .then_with(|| other.len.cmp(&self.len))
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct ScopeIndex {
    entries: BTreeMap<IndexKey, ScopeId>,
}

impl ScopeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, range: (usize, usize), scope: ScopeId) {
        let (start, end) = range;
        self.entries.insert(
            IndexKey {
                start,
                len: end - start,
            },
            scope,
        );
    }

    /// Innermost scope whose range contains `offset`
    pub fn search(&self, offset: usize) -> Option<ScopeId> {
        // All keys with start <= offset sort at or before (offset, 0)
        let query = IndexKey {
            start: offset,
            len: 0,
        };
        self.entries
            .range((Unbounded, Included(query)))
            .rev()
            .find(|(key, _)| key.start + key.len > offset)
            .map(|(_, scope)| *scope)
    }

    /// Re-index `scope` after its range grew.
    ///
    /// Panics if the scope was never inserted; growing an unindexed scope is
    /// a bug in the caller.
    pub fn update(&mut self, scope: ScopeId, old_start: usize, range: (usize, usize)) {
        let query = IndexKey {
            start: old_start,
            len: 0,
        };
        let key = self
            .entries
            .range((Unbounded, Included(query)))
            .rev()
            .take_while(|(key, _)| key.start == old_start)
            .find(|(_, s)| **s == scope)
            .map(|(key, _)| *key)
            .unwrap_or_else(|| panic!("scope {scope:?} is not in the scope index"));
        self.entries.remove(&key);
        self.insert(range, scope);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> ScopeId {
        ScopeId::from_usize(n)
    }

    #[test]
    fn test_innermost_of_nested_ranges() {
        let mut index = ScopeIndex::new();
        index.insert((0, 100), id(1));
        index.insert((10, 50), id(2));
        index.insert((20, 30), id(3));

        assert_eq!(index.search(5), Some(id(1)));
        assert_eq!(index.search(15), Some(id(2)));
        assert_eq!(index.search(25), Some(id(3)));
        assert_eq!(index.search(29), Some(id(3)));
        assert_eq!(index.search(30), Some(id(2)));
        assert_eq!(index.search(60), Some(id(1)));
        assert_eq!(index.search(100), None);
    }

    #[test]
    fn test_siblings_do_not_shadow() {
        let mut index = ScopeIndex::new();
        index.insert((0, 100), id(1));
        index.insert((10, 20), id(2));
        index.insert((40, 50), id(3));

        // Between the siblings only the parent matches
        assert_eq!(index.search(30), Some(id(1)));
        assert_eq!(index.search(45), Some(id(3)));
    }

    #[test]
    fn test_update_after_growth() {
        let mut index = ScopeIndex::new();
        index.insert((0, 100), id(1));
        index.insert((10, 20), id(2));

        assert_eq!(index.search(25), Some(id(1)));
        index.update(id(2), 10, (10, 40));
        assert_eq!(index.search(25), Some(id(2)));
        assert_eq!(index.search(15), Some(id(2)));
    }

    #[test]
    #[should_panic(expected = "not in the scope index")]
    fn test_update_of_unindexed_scope_panics() {
        let mut index = ScopeIndex::new();
        index.insert((0, 100), id(1));
        index.update(id(9), 0, (0, 200));
    }
}
