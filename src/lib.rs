//! Local Cache - an in-process key/value cache with time-based expiration
//!
//! Entries carry an optional expiration and are removed by a sweep that
//! walks an expiration-ordered queue (binary heap or ring buffer). The sweep
//! runs on demand or on a background interval.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{
    with_expires_at, with_on_remove, with_timestamp, with_ttl, EvictionQueue, LocalCache,
    QueueKind, RemovalReason, Stats, Value, ValueOption,
};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{Interval, Signal};
