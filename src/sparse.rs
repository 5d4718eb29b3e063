//! Bounded table keyed by master-assigned indices.
//!
//! Device attribute sets and dataset descriptors are created at indices the
//! master picks, so gaps may exist while a device is being configured.
//! Removing an entry renumbers every higher entry down by one, closing the
//! gap it leaves.

use crate::error::{DbError, Result};

#[derive(Debug, Clone)]
pub(crate) struct SparseTable<T> {
    /// Sorted by index
    entries: Vec<(u16, T)>,
    capacity: usize,
    what: &'static str,
}

impl<T> SparseTable<T> {
    pub(crate) fn new(what: &'static str, capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            what,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, index: u16) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by_key(&index, |(i, _)| *i)
    }

    pub(crate) fn contains(&self, index: u16) -> bool {
        self.position(index).is_ok()
    }

    pub(crate) fn get(&self, index: u16) -> Option<&T> {
        let pos = self.position(index).ok()?;
        Some(&self.entries[pos].1)
    }

    pub(crate) fn get_mut(&mut self, index: u16) -> Option<&mut T> {
        let pos = self.position(index).ok()?;
        Some(&mut self.entries[pos].1)
    }

    /// Insert a new entry. Fails if the table is full; an existing entry at
    /// `index` is kept and `value` dropped.
    pub(crate) fn insert(&mut self, index: u16, value: T) -> Result<bool> {
        match self.position(index) {
            Ok(_) => Ok(false),
            Err(_) if self.entries.len() >= self.capacity => {
                Err(DbError::capacity(self.what, self.capacity))
            }
            Err(pos) => {
                self.entries.insert(pos, (index, value));
                Ok(true)
            }
        }
    }

    /// Remove the entry at `index` and shift every higher index down by one.
    pub(crate) fn remove(&mut self, index: u16) -> Option<T> {
        let pos = self.position(index).ok()?;
        let (_, value) = self.entries.remove(pos);
        for (i, _) in &mut self.entries[pos..] {
            *i -= 1;
        }
        Some(value)
    }

    /// Highest index in use.
    pub(crate) fn last_index(&self) -> Option<u16> {
        self.entries.last().map(|(i, _)| *i)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (u16, &T)> {
        self.entries.iter().map(|(i, v)| (*i, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_with_gaps() {
        let mut table = SparseTable::new("sets", 4);
        assert_eq!(table.insert(5, 'a'), Ok(true));
        assert_eq!(table.insert(1, 'b'), Ok(true));
        assert_eq!(table.insert(5, 'z'), Ok(false));
        assert_eq!(table.get(5), Some(&'a'));
        assert!(table.get(2).is_none());

        let order: Vec<u16> = table.iter().map(|(i, _)| i).collect();
        assert_eq!(order, vec![1, 5]);
        assert_eq!(table.last_index(), Some(5));
    }

    #[test]
    fn test_capacity() {
        let mut table = SparseTable::new("sets", 1);
        table.insert(0, ()).unwrap();
        assert_eq!(table.insert(1, ()), Err(DbError::capacity("sets", 1)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_renumbers_higher() {
        let mut table = SparseTable::new("sets", 8);
        for (i, v) in [(0u16, 'a'), (2, 'b'), (3, 'c'), (7, 'd')] {
            table.insert(i, v).unwrap();
        }

        assert_eq!(table.remove(2), Some('b'));
        let order: Vec<(u16, char)> = table.iter().map(|(i, v)| (i, *v)).collect();
        assert_eq!(order, vec![(0, 'a'), (2, 'c'), (6, 'd')]);
        assert!(table.remove(2).is_some());
        assert!(table.remove(9).is_none());
        assert!(!table.contains(6));
        assert!(table.contains(5));
    }
}
