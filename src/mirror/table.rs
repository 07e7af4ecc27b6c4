use std::collections::BTreeMap;

use super::Row;

/// The cached rows of one table, keyed by the table's row identifier.
///
/// Reads are public; writes go through [`TableMirror`](super::TableMirror) only.
#[derive(Debug, Clone)]
pub struct TableCache<R: Row> {
    rows: BTreeMap<R::Key, R>,
}

impl<R: Row> Default for TableCache<R> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<R: Row> TableCache<R> {
    /// Looks up a row by key.
    #[must_use]
    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.rows.get(key)
    }

    /// Whether a row with this key is cached.
    #[must_use]
    pub fn contains(&self, key: &R::Key) -> bool {
        self.rows.contains_key(key)
    }

    /// All rows in key order.
    pub fn iter(&self) -> impl Iterator<Item = &R> + '_ {
        self.rows.values()
    }

    /// All `(key, row)` pairs in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&R::Key, &R)> + '_ {
        self.rows.iter()
    }

    /// Number of cached rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn insert(&mut self, key: R::Key, row: R) -> Option<R> {
        self.rows.insert(key, row)
    }

    pub(crate) fn remove(&mut self, key: &R::Key) -> Option<R> {
        self.rows.remove(key)
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
    }
}
