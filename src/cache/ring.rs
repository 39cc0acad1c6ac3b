//! Ring Queue Module
//!
//! Circular-buffer backend for the eviction queue.

use std::sync::Arc;

use crate::cache::{EvictionQueue, Value};

/// Capacity a new or reset ring starts with.
pub const RING_DEFAULT_CAPACITY: usize = 4;

/// Smallest number of slots a grow adds.
pub const RING_MINIMUM_GROW: usize = 4;

type Slot<K, V> = Option<Arc<Value<K, V>>>;

// == Ring Queue ==
/// Eviction queue backed by a growable circular buffer.
///
/// Entries are kept in expiration order by position rather than by a heap
/// invariant. Pushing a value that expires no earlier than the current tail
/// is O(1) amortized. An earlier value is placed by binary search and only
/// the entries behind it shift, so a never-expiring tail costs one move.
/// `fix` with a new expiration rebuilds the buffer from a stable sort.
#[derive(Debug)]
pub struct RingQueue<K, V> {
    buffer: Vec<Slot<K, V>>,
    head: usize,
    tail: usize,
    size: usize,
}

fn empty_slots<K, V>(capacity: usize) -> Vec<Slot<K, V>> {
    (0..capacity).map(|_| None).collect()
}

impl<K, V> Default for RingQueue<K, V> {
    fn default() -> Self {
        Self {
            buffer: empty_slots(RING_DEFAULT_CAPACITY),
            head: 0,
            tail: 0,
            size: 0,
        }
    }
}

impl<K: Eq, V> RingQueue<K, V> {
    // == Constructor ==
    /// Creates a new empty ring with the default capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of slots, including empty ones.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the last (latest-expiring) value without removing it.
    pub fn peek_back(&self) -> Option<&Arc<Value<K, V>>> {
        if self.size == 0 {
            return None;
        }
        let index = if self.tail == 0 {
            self.buffer.len() - 1
        } else {
            self.tail - 1
        };
        self.buffer[index].as_ref()
    }

    /// Iterates the entries from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Value<K, V>>> + '_ {
        let capacity = self.buffer.len();
        (0..self.size)
            .filter_map(move |offset| self.buffer[(self.head + offset) % capacity].as_ref())
    }

    // == Clear ==
    /// Drops every entry but keeps the current capacity.
    pub fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.tail = 0;
        self.size = 0;
    }

    // == Trim Excess ==
    /// Shrinks the buffer to the live count when under 90% of it is in use.
    pub fn trim_excess(&mut self) {
        let threshold = (self.buffer.len() as f64 * 0.9) as usize;
        if self.size < threshold {
            self.set_capacity(self.size);
        }
    }

    /// Appends at the tail without checking order.
    fn enqueue(&mut self, value: Arc<Value<K, V>>) {
        if self.size == self.buffer.len() {
            self.set_capacity(self.grow_capacity());
        }
        self.buffer[self.tail] = Some(value);
        self.tail = (self.tail + 1) % self.buffer.len();
        self.size += 1;
    }

    /// Logical offset of the first entry that expires after `value`.
    fn insertion_point(&self, value: &Value<K, V>) -> usize {
        let capacity = self.buffer.len();
        let (mut low, mut high) = (0, self.size);
        while low < high {
            let mid = low + (high - low) / 2;
            match self.buffer[(self.head + mid) % capacity].as_ref() {
                Some(slot) if !value.expires_before(slot) => low = mid + 1,
                _ => high = mid,
            }
        }
        low
    }

    /// Inserts at a logical offset, shifting the entries behind it one slot toward the tail.
    fn insert_at(&mut self, position: usize, value: Arc<Value<K, V>>) {
        if self.size == self.buffer.len() {
            self.set_capacity(self.grow_capacity());
        }
        let capacity = self.buffer.len();
        for offset in (position..self.size).rev() {
            let from = (self.head + offset) % capacity;
            let to = (self.head + offset + 1) % capacity;
            self.buffer[to] = self.buffer[from].take();
        }
        self.buffer[(self.head + position) % capacity] = Some(value);
        self.tail = (self.tail + 1) % capacity;
        self.size += 1;
    }

    fn dequeue(&mut self) -> Option<Arc<Value<K, V>>> {
        if self.size == 0 {
            return None;
        }
        let removed = self.buffer[self.head].take();
        self.head = (self.head + 1) % self.buffer.len();
        self.size -= 1;
        removed
    }

    /// Empties the ring into a vector in head-to-tail order.
    fn drain_ordered(&mut self) -> Vec<Arc<Value<K, V>>> {
        let mut values = Vec::with_capacity(self.size);
        while let Some(value) = self.dequeue() {
            values.push(value);
        }
        values
    }

    /// Refills the ring from an already ordered vector, keeping at least the current capacity.
    fn rebuild(&mut self, values: Vec<Arc<Value<K, V>>>) {
        let capacity = self.buffer.len().max(values.len());
        self.buffer = empty_slots(capacity);
        self.size = values.len();
        for (slot, value) in self.buffer.iter_mut().zip(values) {
            *slot = Some(value);
        }
        self.head = 0;
        self.tail = if capacity == 0 { 0 } else { self.size % capacity };
    }

    fn grow_capacity(&self) -> usize {
        let size = self.buffer.len();
        (size << 1).max(size + RING_MINIMUM_GROW)
    }

    fn set_capacity(&mut self, capacity: usize) {
        let values = self.drain_ordered();
        let size = values.len();
        let mut resized = empty_slots(capacity);
        for (slot, value) in resized.iter_mut().zip(values) {
            *slot = Some(value);
        }
        self.buffer = resized;
        self.head = 0;
        self.size = size;
        self.tail = if size == capacity { 0 } else { size };
    }
}

fn sort_by_expiration<K, V>(values: &mut [Arc<Value<K, V>>]) {
    values.sort_by(|a, b| {
        if a.expires_before(b) {
            std::cmp::Ordering::Less
        } else if b.expires_before(a) {
            std::cmp::Ordering::Greater
        } else {
            std::cmp::Ordering::Equal
        }
    });
}

impl<K, V> EvictionQueue<K, V> for RingQueue<K, V>
where
    K: Eq + Send + Sync,
    V: Send + Sync,
{
    fn len(&self) -> usize {
        self.size
    }

    fn push(&mut self, value: Arc<Value<K, V>>) {
        let in_order = self
            .peek_back()
            .map_or(true, |back| !value.expires_before(back));
        if in_order {
            self.enqueue(value);
            return;
        }
        let position = self.insertion_point(&value);
        self.insert_at(position, value);
    }

    fn pop(&mut self) -> Option<Arc<Value<K, V>>> {
        self.dequeue()
    }

    fn peek(&self) -> Option<&Arc<Value<K, V>>> {
        if self.size == 0 {
            return None;
        }
        self.buffer[self.head].as_ref()
    }

    fn fix(&mut self, value: Arc<Value<K, V>>) {
        if self.size == 0 {
            return;
        }
        let mut values = self.drain_ordered();
        let mut changed = false;
        if let Some(existing) = values.iter_mut().find(|v| v.key == value.key) {
            changed = existing.expires != value.expires;
            *existing = value;
        }
        if changed {
            sort_by_expiration(&mut values);
        }
        self.rebuild(values);
    }

    fn remove(&mut self, key: &K) {
        if self.size == 0 {
            return;
        }
        let survivors: Vec<_> = self
            .drain_ordered()
            .into_iter()
            .filter(|v| v.key != *key)
            .collect();
        for value in survivors {
            self.enqueue(value);
        }
    }

    fn consume(&mut self, consumer: &mut dyn FnMut(&Arc<Value<K, V>>) -> bool) {
        while let Some(head) = self.peek() {
            if !consumer(head) {
                return;
            }
            self.dequeue();
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
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

    fn keys(ring: &RingQueue<&'static str, ()>) -> Vec<&'static str> {
        ring.iter().map(|v| v.key).collect()
    }

    #[test]
    fn test_ring_push_pop_and_grow() {
        let mut ring = RingQueue::new();
        assert_eq!(ring.capacity(), RING_DEFAULT_CAPACITY);
        assert!(ring.peek().is_none());
        assert!(ring.peek_back().is_none());

        for (i, key) in ["0", "1", "2", "3", "4", "5"].into_iter().enumerate() {
            ring.push(entry(key, day(10 + i as u32)));
        }

        assert_eq!(ring.len(), 6);
        assert_eq!(ring.capacity(), 8);
        assert_eq!(ring.peek().unwrap().key, "0");
        assert_eq!(ring.peek_back().unwrap().key, "5");

        assert_eq!(ring.pop().unwrap().key, "0");
        assert_eq!(ring.pop().unwrap().key, "1");
        assert_eq!(ring.len(), 4);
        assert_eq!(keys(&ring), vec!["2", "3", "4", "5"]);
    }

    #[test]
    fn test_ring_wraps_around() {
        let mut ring = RingQueue::new();
        ring.push(entry("a", day(10)));
        ring.push(entry("b", day(11)));
        ring.push(entry("c", day(12)));
        ring.pop();
        ring.pop();
        ring.push(entry("d", day(13)));
        ring.push(entry("e", day(14)));
        ring.push(entry("f", day(15)));

        assert_eq!(ring.capacity(), RING_DEFAULT_CAPACITY);
        assert_eq!(keys(&ring), vec!["c", "d", "e", "f"]);
        assert_eq!(ring.peek_back().unwrap().key, "f");

        ring.push(entry("g", day(16)));
        assert_eq!(ring.capacity(), 8);
        assert_eq!(keys(&ring), vec!["c", "d", "e", "f", "g"]);
    }

    #[test]
    fn test_ring_out_of_order_push_sorts() {
        let mut ring = RingQueue::new();
        for (key, d) in [("5", 18), ("2", 15), ("3", 16), ("0", 13), ("4", 17), ("1", 14)] {
            ring.push(entry(key, day(d)));
        }

        let popped: Vec<_> = std::iter::from_fn(|| ring.pop()).map(|v| v.key).collect();
        assert_eq!(popped, vec!["0", "1", "2", "3", "4", "5"]);
    }

    #[test]
    fn test_ring_equal_expirations_keep_insertion_order() {
        let mut ring = RingQueue::new();
        ring.push(entry("b", day(14)));
        ring.push(entry("c", day(14)));
        ring.push(entry("a", day(13)));

        assert_eq!(keys(&ring), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ring_clear() {
        let mut ring = RingQueue::new();
        for (i, key) in ["0", "1", "2", "3", "4"].into_iter().enumerate() {
            ring.push(entry(key, day(10 + i as u32)));
        }
        let capacity = ring.capacity();

        ring.clear();

        assert_eq!(ring.len(), 0);
        assert_eq!(ring.capacity(), capacity);
        assert!(ring.peek().is_none());
    }

    #[test]
    fn test_ring_fix() {
        let mut ring = RingQueue::new();
        ring.push(entry("1", day(13)));
        ring.push(entry("2", day(14)));
        ring.push(entry("3", day(15)));
        assert_eq!(ring.peek().unwrap().key, "1");

        ring.fix(entry("3", day(1)));
        assert_eq!(keys(&ring), vec!["3", "1", "2"]);

        ring.fix(entry("3", day(20)));
        assert_eq!(keys(&ring), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_ring_fix_unchanged_replaces_handle() {
        let mut ring = RingQueue::new();
        ring.push(entry("1", day(13)));
        ring.push(entry("2", day(14)));

        let replacement = entry("2", day(14));
        ring.fix(Arc::clone(&replacement));

        assert_eq!(keys(&ring), vec!["1", "2"]);
        assert!(Arc::ptr_eq(ring.peek_back().unwrap(), &replacement));
    }

    #[test]
    fn test_ring_push_before_never_expiring_tail() {
        let mut ring: RingQueue<u32, ()> = RingQueue::new();
        ring.push(Arc::new(Value::new(u32::MAX, ())));
        for minute in 0..50u32 {
            let expires = day(1) + chrono::Duration::minutes(minute.into());
            ring.push(Arc::new(
                Value::new(minute, ()).with_options([with_expires_at(expires)]),
            ));
            assert_eq!(ring.peek_back().unwrap().key, u32::MAX);
        }

        assert_eq!(ring.len(), 51);
        assert_eq!(ring.capacity(), 64);
        let popped: Vec<_> = std::iter::from_fn(|| ring.pop()).map(|v| v.key).collect();
        let mut expected: Vec<u32> = (0..50).collect();
        expected.push(u32::MAX);
        assert_eq!(popped, expected);
    }

    #[test]
    fn test_ring_out_of_order_push_across_wrap() {
        let mut ring = RingQueue::new();
        ring.push(entry("a", day(10)));
        ring.push(entry("b", day(11)));
        ring.push(entry("c", day(12)));
        ring.pop();
        ring.pop();
        ring.push(Arc::new(Value::new("never", ())));

        ring.push(entry("d", day(13)));
        ring.push(entry("e", day(14)));
        assert_eq!(ring.capacity(), RING_DEFAULT_CAPACITY);
        assert_eq!(keys(&ring), vec!["c", "d", "e", "never"]);

        ring.push(entry("f", day(15)));
        assert_eq!(ring.capacity(), 8);
        assert_eq!(keys(&ring), vec!["c", "d", "e", "f", "never"]);
        assert_eq!(ring.peek().unwrap().key, "c");
        assert_eq!(ring.peek_back().unwrap().key, "never");
    }

    #[test]
    fn test_ring_fix_unknown_key_is_noop() {
        let mut ring = RingQueue::new();
        ring.push(entry("1", day(13)));
        ring.push(entry("2", day(14)));
        ring.push(entry("3", day(15)));

        ring.fix(entry("missing", day(1)));

        assert_eq!(ring.len(), 3);
        assert_eq!(keys(&ring), vec!["1", "2", "3"]);
        assert_eq!(ring.peek().unwrap().key, "1");
    }

    #[test]
    fn test_ring_fix_empty_is_noop() {
        let mut ring: RingQueue<&str, ()> = RingQueue::new();
        ring.fix(entry("1", day(13)));
        assert!(ring.is_empty());
    }

    #[test]
    fn test_ring_remove() {
        let mut ring = RingQueue::new();
        ring.push(entry("1", day(13)));
        ring.push(entry("2", day(14)));
        ring.push(entry("3", day(15)));

        ring.remove(&"2");
        assert_eq!(keys(&ring), vec!["1", "3"]);

        ring.remove(&"missing");
        assert_eq!(keys(&ring), vec!["1", "3"]);

        ring.remove(&"1");
        ring.remove(&"3");
        assert!(ring.is_empty());
        ring.remove(&"3");
    }

    #[test]
    fn test_ring_consume() {
        let mut ring = RingQueue::new();
        for (i, key) in ["0", "1", "2", "3", "4", "5"].into_iter().enumerate() {
            ring.push(entry(key, day(10 + i as u32)));
        }

        ring.consume(&mut |v| v.expires.unwrap() < day(13));

        assert_eq!(ring.len(), 3);
        assert_eq!(ring.peek().unwrap().key, "3");

        ring.consume(&mut |_| true);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_ring_trim_excess() {
        let mut ring = RingQueue::new();
        for (i, key) in ["0", "1", "2", "3", "4"].into_iter().enumerate() {
            ring.push(entry(key, day(10 + i as u32)));
        }
        assert_eq!(ring.capacity(), 8);

        ring.trim_excess();

        assert_eq!(ring.capacity(), 5);
        assert_eq!(keys(&ring), vec!["0", "1", "2", "3", "4"]);

        ring.push(entry("5", day(20)));
        assert_eq!(ring.capacity(), 10);
        assert_eq!(ring.len(), 6);
    }

    #[test]
    fn test_ring_trim_to_empty_then_push() {
        let mut ring = RingQueue::new();
        ring.trim_excess();
        assert_eq!(ring.capacity(), 0);

        ring.push(entry("a", day(10)));
        assert_eq!(ring.capacity(), RING_MINIMUM_GROW);
        assert_eq!(ring.peek().unwrap().key, "a");
    }

    #[test]
    fn test_ring_reset_restores_default_capacity() {
        let mut ring = RingQueue::new();
        for (i, key) in ["0", "1", "2", "3", "4", "5"].into_iter().enumerate() {
            ring.push(entry(key, day(10 + i as u32)));
        }

        ring.reset();

        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), RING_DEFAULT_CAPACITY);
    }

    #[test]
    fn test_ring_never_expiring_sorts_last() {
        let mut ring = RingQueue::new();
        ring.push(Arc::new(Value::new("never", ())));
        ring.push(entry("soon", day(13)));

        assert_eq!(ring.peek().unwrap().key, "soon");
        assert_eq!(ring.peek_back().unwrap().key, "never");
    }
}
