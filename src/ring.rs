//! Fixed-capacity, most-recent-first ring buffer.

use std::collections::VecDeque;

/// A bounded buffer that always inserts at the front and evicts from the back.
///
/// Iteration yields entries newest-first. A capacity of zero is clamped to one.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Inserts `item` as the newest entry, returning the evicted oldest entry once full.
    pub fn push_front(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_back()
        } else {
            None
        };
        self.items.push_front(item);
        evicted
    }

    /// Entries, newest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        self.items.iter()
    }

    /// The newest entry.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the buffer holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Mutable access to the first entry matching `pred`.
    pub fn find_mut(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<&mut T> {
        self.items.iter_mut().find(|item| pred(item))
    }

    /// Removes and returns the first entry matching `pred`, keeping the order of the rest.
    pub fn remove_first(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        let index = self.items.iter().position(|item| pred(item))?;
        self.items.remove(index)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_clamped() {
        let mut ring = RingBuffer::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push_front(1);
        assert_eq!(ring.push_front(2), Some(1));
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn overflow_evicts_oldest_and_keeps_newest_first() {
        let mut ring = RingBuffer::new(3);
        for n in 1..=3 {
            assert_eq!(ring.push_front(n), None);
        }
        assert_eq!(ring.push_front(4), Some(1));
        let order: Vec<_> = ring.iter().copied().collect();
        assert_eq!(order, vec![4, 3, 2]);
    }

    #[test]
    fn remove_first_keeps_order() {
        let mut ring = RingBuffer::new(4);
        for n in 1..=4 {
            ring.push_front(n);
        }
        assert_eq!(ring.remove_first(|n| *n == 3), Some(3));
        let order: Vec<_> = ring.iter().copied().collect();
        assert_eq!(order, vec![4, 2, 1]);
        assert_eq!(ring.remove_first(|n| *n == 9), None);
    }

    #[test]
    fn find_mut_replaces_in_place() {
        let mut ring = RingBuffer::new(2);
        ring.push_front(10);
        ring.push_front(20);
        if let Some(slot) = ring.find_mut(|n| *n == 10) {
            *slot = 11;
        }
        let order: Vec<_> = ring.iter().copied().collect();
        assert_eq!(order, vec![20, 11]);
    }
}
