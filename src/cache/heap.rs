//! Heap Queue Module
//!
//! Binary min-heap backend for the eviction queue.

use std::sync::Arc;

use crate::cache::{EvictionQueue, Value};

// == Heap Queue ==
/// Eviction queue backed by a binary min-heap keyed on expiration.
///
/// `push`/`pop` are O(log n). `fix` and `remove` find the key with a linear
/// scan and then resift in O(log n).
#[derive(Debug)]
pub struct HeapQueue<K, V> {
    values: Vec<Arc<Value<K, V>>>,
}

impl<K, V> Default for HeapQueue<K, V> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<K: Eq, V> HeapQueue<K, V> {
    // == Constructor ==
    /// Creates a new empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates the entries in heap (not sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Value<K, V>>> {
        self.values.iter()
    }

    fn position(&self, key: &K) -> Option<usize> {
        self.values.iter().position(|v| v.key == *key)
    }

    fn less(&self, i: usize, j: usize) -> bool {
        self.values[i].expires_before(&self.values[j])
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if !self.less(index, parent) {
                break;
            }
            self.values.swap(index, parent);
            index = parent;
        }
    }

    /// Returns true if the element moved.
    fn sift_down(&mut self, start: usize) -> bool {
        let len = self.values.len();
        let mut index = start;
        loop {
            let left = 2 * index + 1;
            if left >= len {
                break;
            }
            let mut child = left;
            let right = left + 1;
            if right < len && self.less(right, left) {
                child = right;
            }
            if !self.less(child, index) {
                break;
            }
            self.values.swap(index, child);
            index = child;
        }
        index > start
    }

    /// Restores the heap property around an element whose priority changed.
    fn resift(&mut self, index: usize) {
        if !self.sift_down(index) {
            self.sift_up(index);
        }
    }
}

impl<K, V> EvictionQueue<K, V> for HeapQueue<K, V>
where
    K: Eq + Send + Sync,
    V: Send + Sync,
{
    fn len(&self) -> usize {
        self.values.len()
    }

    fn push(&mut self, value: Arc<Value<K, V>>) {
        self.values.push(value);
        let last = self.values.len() - 1;
        self.sift_up(last);
    }

    fn pop(&mut self) -> Option<Arc<Value<K, V>>> {
        if self.values.is_empty() {
            return None;
        }
        let removed = self.values.swap_remove(0);
        if !self.values.is_empty() {
            self.sift_down(0);
        }
        Some(removed)
    }

    fn peek(&self) -> Option<&Arc<Value<K, V>>> {
        self.values.first()
    }

    fn fix(&mut self, value: Arc<Value<K, V>>) {
        if let Some(index) = self.position(&value.key) {
            self.values[index] = value;
            self.resift(index);
        }
    }

    fn remove(&mut self, key: &K) {
        let Some(index) = self.position(key) else {
            return;
        };
        self.values.swap_remove(index);
        if index < self.values.len() {
            self.resift(index);
        }
    }

    fn consume(&mut self, consumer: &mut dyn FnMut(&Arc<Value<K, V>>) -> bool) {
        while let Some(head) = self.values.first() {
            if !consumer(head) {
                return;
            }
            self.pop();
        }
    }

    fn reset(&mut self) {
        self.values = Vec::new();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::with_expires_at;
    use chrono::{DateTime, TimeZone, Utc};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 6, d, 12, 10, 9).unwrap()
    }

    fn entry(key: &'static str, expires: DateTime<Utc>) -> Arc<Value<&'static str, ()>> {
        Arc::new(Value::new(key, ()).with_options([with_expires_at(expires)]))
    }

    fn expirations(heap: &mut HeapQueue<&'static str, ()>) -> Vec<DateTime<Utc>> {
        std::iter::from_fn(|| heap.pop())
            .filter_map(|v| v.expires)
            .collect()
    }

    #[test]
    fn test_heap_pops_in_expiration_order() {
        let mut heap = HeapQueue::new();
        for (key, d) in [("5", 18), ("2", 15), ("3", 16), ("0", 13), ("4", 17), ("1", 14)] {
            heap.push(entry(key, day(d)));
        }
        assert_eq!(heap.len(), 6);
        assert_eq!(heap.peek().unwrap().expires, Some(day(13)));

        assert_eq!(
            expirations(&mut heap),
            vec![day(13), day(14), day(15), day(16), day(17), day(18)]
        );
        assert!(heap.pop().is_none());
    }

    #[test]
    fn test_heap_empty() {
        let mut heap: HeapQueue<&str, ()> = HeapQueue::new();

        heap.fix(entry("1", day(13)));
        heap.remove(&"1");
        heap.consume(&mut |_| true);

        assert!(heap.pop().is_none());
        assert!(heap.peek().is_none());
        assert!(heap.is_empty());
    }

    #[test]
    fn test_heap_consume_until() {
        let mut heap = HeapQueue::new();
        for (key, d) in [("5", 18), ("2", 15), ("3", 16), ("0", 13), ("4", 17), ("1", 14)] {
            heap.push(entry(key, day(d)));
        }

        let mut seen = Vec::new();
        heap.consume(&mut |v| {
            seen.push(v.key);
            v.expires.unwrap() < day(16)
        });

        assert_eq!(seen, vec!["0", "1", "2", "3"]);
        assert_eq!(heap.len(), 3, "consume should have removed three items");
        assert_eq!(heap.peek().unwrap().key, "3");
    }

    #[test]
    fn test_heap_fix_moves_earlier() {
        let mut heap = HeapQueue::new();
        heap.push(entry("1", day(13)));
        heap.push(entry("2", day(14)));
        heap.push(entry("3", day(15)));
        assert_eq!(heap.peek().unwrap().key, "1");

        heap.fix(entry("3", day(1)));

        assert_eq!(heap.peek().unwrap().key, "3");
        assert_eq!(heap.len(), 3);
    }

    #[test]
    fn test_heap_fix_moves_later() {
        let mut heap = HeapQueue::new();
        heap.push(entry("1", day(13)));
        heap.push(entry("2", day(14)));
        heap.push(entry("3", day(15)));

        heap.fix(entry("1", day(20)));

        let keys: Vec<_> = std::iter::from_fn(|| heap.pop()).map(|v| v.key).collect();
        assert_eq!(keys, vec!["2", "3", "1"]);
    }

    #[test]
    fn test_heap_fix_unchanged_keeps_order() {
        let mut heap = HeapQueue::new();
        heap.push(entry("1", day(13)));
        heap.push(entry("2", day(14)));
        heap.push(entry("3", day(15)));

        let replacement = entry("2", day(14));
        heap.fix(Arc::clone(&replacement));

        assert!(heap.iter().any(|v| Arc::ptr_eq(v, &replacement)));
        assert_eq!(expirations(&mut heap), vec![day(13), day(14), day(15)]);
    }

    #[test]
    fn test_heap_fix_unknown_key_is_noop() {
        let mut heap = HeapQueue::new();
        heap.push(entry("1", day(13)));

        heap.fix(entry("missing", day(1)));

        assert_eq!(heap.len(), 1);
        assert_eq!(heap.peek().unwrap().key, "1");
    }

    #[test]
    fn test_heap_remove() {
        let mut heap = HeapQueue::new();
        heap.push(entry("1", day(13)));
        heap.push(entry("2", day(14)));
        heap.push(entry("3", day(15)));
        assert_eq!(heap.peek().unwrap().expires, Some(day(13)));

        heap.remove(&"1");

        assert_eq!(heap.len(), 2);
        assert_eq!(heap.peek().unwrap().expires, Some(day(14)));
    }

    #[test]
    fn test_heap_remove_from_middle_keeps_order() {
        let mut heap = HeapQueue::new();
        for (key, d) in [("a", 10), ("b", 11), ("c", 12), ("d", 13), ("e", 14), ("f", 15)] {
            heap.push(entry(key, day(d)));
        }

        heap.remove(&"c");
        heap.remove(&"missing");

        let keys: Vec<_> = std::iter::from_fn(|| heap.pop()).map(|v| v.key).collect();
        assert_eq!(keys, vec!["a", "b", "d", "e", "f"]);
    }

    #[test]
    fn test_heap_never_expiring_sorts_last() {
        let mut heap = HeapQueue::new();
        heap.push(Arc::new(Value::new("never", ())));
        heap.push(entry("soon", day(13)));

        assert_eq!(heap.peek().unwrap().key, "soon");
    }

    #[test]
    fn test_heap_reset() {
        let mut heap = HeapQueue::new();
        heap.push(entry("1", day(13)));
        heap.push(entry("2", day(14)));

        heap.reset();

        assert!(heap.is_empty());
        assert!(heap.peek().is_none());
    }
}
