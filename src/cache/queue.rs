//! Eviction Queue Module
//!
//! The expiration-ordered queue the cache sweeps from, and the selector for
//! its two backends.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::cache::{HeapQueue, RingQueue, Value};
use crate::error::CacheError;

// == Eviction Queue ==
/// A priority queue of cached values ordered by expiration, earliest first.
///
/// Values without an expiration sort after every value that has one. The
/// queue holds at most one entry per key; updates to an existing key go
/// through [`EvictionQueue::fix`], never [`EvictionQueue::push`].
pub trait EvictionQueue<K, V>: Send + Sync {
    /// Number of entries currently queued.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a value whose key is not yet queued.
    fn push(&mut self, value: Arc<Value<K, V>>);

    /// Removes and returns the earliest-expiring value.
    fn pop(&mut self) -> Option<Arc<Value<K, V>>>;

    /// Returns the earliest-expiring value without removing it.
    fn peek(&self) -> Option<&Arc<Value<K, V>>>;

    /// Replaces the entry queued under `value.key` and restores ordering.
    ///
    /// Does nothing if the key is not queued.
    fn fix(&mut self, value: Arc<Value<K, V>>);

    /// Drops the entry queued under `key`, if any.
    fn remove(&mut self, key: &K);

    /// Pops values from the head for as long as `consumer` returns true.
    ///
    /// The value for which `consumer` returns false stays at the head.
    fn consume(&mut self, consumer: &mut dyn FnMut(&Arc<Value<K, V>>) -> bool);

    /// Drops every entry, returning the queue to its initial state.
    fn reset(&mut self);
}

// == Queue Kind ==
/// Selects the [`EvictionQueue`] backend a cache is built with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Binary min-heap; cheap random updates
    Heap,
    /// Circular buffer in expiration order; cheap in-order pushes
    #[default]
    Ring,
}

impl QueueKind {
    /// Builds an empty queue of this kind.
    pub fn build<K, V>(self) -> Box<dyn EvictionQueue<K, V>>
    where
        K: Eq + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        match self {
            QueueKind::Heap => Box::new(HeapQueue::new()),
            QueueKind::Ring => Box::new(RingQueue::new()),
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueKind::Heap => f.write_str("heap"),
            QueueKind::Ring => f.write_str("ring"),
        }
    }
}

impl FromStr for QueueKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heap" => Ok(QueueKind::Heap),
            "ring" | "queue" => Ok(QueueKind::Ring),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown eviction queue: {}",
                other
            ))),
        }
    }
}
