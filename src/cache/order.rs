//! Insertion Order Module
//!
//! Tracks the order keys were stored in, for oldest-first eviction.

use std::collections::VecDeque;

// == Insertion Order ==
/// Tracks store order of keys.
///
/// Keys are stored in a VecDeque where:
/// - Front = Most recently stored
/// - Back = Oldest
///
/// Reads do not reorder keys; only a (re-)store does.
#[derive(Debug, Default)]
pub struct InsertionOrder {
    order: VecDeque<String>,
}

impl InsertionOrder {
    // == Constructor ==
    /// Creates a new empty tracker.
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Record ==
    /// Marks a key as the newest insertion.
    ///
    /// A key already tracked is moved to the front.
    pub fn record(&mut self, key: &str) {
        self.remove(key);
        self.order.push_front(key.to_string());
    }

    // == Remove ==
    /// Removes a key from the tracker.
    pub fn remove(&mut self, key: &str) {
        self.order.retain(|k| k != key);
    }

    // == Pop Oldest ==
    /// Returns and removes the oldest key, or None if empty.
    pub fn pop_oldest(&mut self) -> Option<String> {
        self.order.pop_back()
    }

    // == Peek Oldest ==
    /// Returns the oldest key without removing it.
    pub fn peek_oldest(&self) -> Option<&String> {
        self.order.back()
    }

    /// Drops every tracked key.
    pub fn clear(&mut self) {
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.order.iter().any(|k| k == key)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_new() {
        let order = InsertionOrder::new();
        assert!(order.is_empty());
        assert_eq!(order.len(), 0);
    }

    #[test]
    fn test_record_keeps_first_as_oldest() {
        let mut order = InsertionOrder::new();

        order.record("/a");
        order.record("/b");
        order.record("/c");

        assert_eq!(order.len(), 3);
        assert_eq!(order.peek_oldest(), Some(&"/a".to_string()));
    }

    #[test]
    fn test_rerecord_moves_to_newest() {
        let mut order = InsertionOrder::new();

        order.record("/a");
        order.record("/b");
        order.record("/a");

        assert_eq!(order.len(), 2);
        assert_eq!(order.pop_oldest(), Some("/b".to_string()));
        assert_eq!(order.pop_oldest(), Some("/a".to_string()));
        assert_eq!(order.pop_oldest(), None);
    }

    #[test]
    fn test_remove() {
        let mut order = InsertionOrder::new();

        order.record("/a");
        order.record("/b");
        order.remove("/a");
        order.remove("/missing");

        assert_eq!(order.len(), 1);
        assert!(!order.contains("/a"));
        assert!(order.contains("/b"));
    }

    #[test]
    fn test_clear() {
        let mut order = InsertionOrder::new();
        order.record("/a");
        order.clear();
        assert!(order.is_empty());
    }
}
