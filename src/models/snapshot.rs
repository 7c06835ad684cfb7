use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::CategoryRecord;

/// An ordered, id-deduplicated view of the cache, ready to be rendered.
///
/// A snapshot is always a single flat section; item identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Snapshot {
    items: Vec<CategoryRecord>,
}

/// Id-level changes between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SnapshotDiff {
    /// Ids present now but not before, in current order.
    pub inserted: Vec<i64>,
    /// Ids present before but not now, in previous order.
    pub removed: Vec<i64>,
    /// Ids present in both whose field values changed.
    pub updated: Vec<i64>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

impl Snapshot {
    /// Builds a snapshot, keeping the first occurrence of each id.
    pub fn new(records: impl IntoIterator<Item = CategoryRecord>) -> Self {
        let mut seen = HashSet::new();
        let items = records
            .into_iter()
            .filter(|r| seen.insert(r.id))
            .collect();
        Self { items }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CategoryRecord] {
        &self.items
    }

    pub fn ids(&self) -> Vec<i64> {
        self.items.iter().map(|r| r.id).collect()
    }

    pub fn get(&self, id: i64) -> Option<&CategoryRecord> {
        self.items.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Computes what changed going from `previous` to `self`.
    pub fn diff(&self, previous: &Snapshot) -> SnapshotDiff {
        let before: HashMap<i64, &CategoryRecord> =
            previous.items.iter().map(|r| (r.id, r)).collect();
        let now: HashSet<i64> = self.items.iter().map(|r| r.id).collect();

        let mut diff = SnapshotDiff::default();
        for record in &self.items {
            match before.get(&record.id) {
                None => diff.inserted.push(record.id),
                Some(old) if *old != record => diff.updated.push(record.id),
                Some(_) => {}
            }
        }
        diff.removed = previous
            .items
            .iter()
            .map(|r| r.id)
            .filter(|id| !now.contains(id))
            .collect();
        diff
    }
}

impl IntoIterator for Snapshot {
    type Item = CategoryRecord;
    type IntoIter = std::vec::IntoIter<CategoryRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn rec(id: i64, name: &str) -> CategoryRecord {
        Category::new(id, name).into()
    }

    #[test]
    fn test_new_dedupes_by_id_keeping_order() {
        let snapshot = Snapshot::new(vec![rec(1, "a"), rec(3, "c"), rec(1, "dup"), rec(2, "b")]);
        assert_eq!(snapshot.ids(), vec![1, 3, 2]);
        assert_eq!(snapshot.get(1).unwrap().name, "a");
    }

    #[test]
    fn test_diff_detects_inserts_removals_and_updates() {
        let previous = Snapshot::new(vec![rec(1, "a"), rec(2, "b"), rec(3, "c")]);
        let current = Snapshot::new(vec![rec(2, "b"), rec(3, "C"), rec(4, "d")]);

        let diff = current.diff(&previous);
        assert_eq!(diff.inserted, vec![4]);
        assert_eq!(diff.removed, vec![1]);
        assert_eq!(diff.updated, vec![3]);
        assert!(!diff.is_empty());
    }

    #[test]
    fn test_diff_of_identical_snapshots_is_empty() {
        let snapshot = Snapshot::new(vec![rec(1, "a"), rec(2, "b")]);
        assert!(snapshot.diff(&snapshot.clone()).is_empty());
        assert!(Snapshot::empty().diff(&Snapshot::empty()).is_empty());
    }
}
