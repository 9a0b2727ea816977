//! Bounded FIFO set of event identities.

use std::collections::{HashSet, VecDeque};

/// Remembers up to `capacity` ids; the oldest is forgotten first.
#[derive(Debug, Clone)]
pub struct BoundedIdSet {
    capacity: usize,
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl BoundedIdSet {
    /// Create a set holding at most `capacity` ids (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    /// Record `id`. Returns `false` if it was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_duplicates() {
        let mut set = BoundedIdSet::new(4);
        assert!(set.insert("a"));
        assert!(!set.insert("a"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut set = BoundedIdSet::new(2);
        set.insert("a");
        set.insert("b");
        set.insert("c");
        assert!(!set.contains("a"));
        assert!(set.contains("b"));
        assert!(set.contains("c"));
        assert_eq!(set.len(), 2);
        // Evicted ids are admitted again.
        assert!(set.insert("a"));
        assert!(!set.contains("b"));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut set = BoundedIdSet::new(0);
        assert_eq!(set.capacity(), 1);
        assert!(set.insert("a"));
        assert!(!set.insert("a"));
        assert!(set.insert("b"));
        assert!(!set.contains("a"));
    }
}
