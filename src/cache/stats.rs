//! Cache Statistics Module
//!
//! Point-in-time snapshot of what the cache is holding.

use std::time::Duration;

use serde::Serialize;

// == Cache Stats ==
/// Snapshot of the cache contents.
///
/// Informational only: the cache has no capacity bound, so nothing here
/// drives eviction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Number of entries held
    pub count: usize,
    /// Approximate bytes held by the entries themselves (not the map or queue)
    pub size_bytes: usize,
    /// Age of the oldest entry, measured from its timestamp
    pub max_age: Duration,
}

impl Stats {
    // == Constructor ==
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Entry ==
    /// Folds one entry of `size_bytes` bytes and `age` into the snapshot.
    pub fn record_entry(&mut self, size_bytes: usize, age: Duration) {
        self.count += 1;
        self.size_bytes += size_bytes;
        if self.max_age < age {
            self.max_age = age;
        }
    }
}
