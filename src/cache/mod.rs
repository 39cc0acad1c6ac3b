//! Cache Module
//!
//! Provides an in-memory cache with TTL expiration, two interchangeable
//! expiration queues and a background sweeper.

mod heap;
mod queue;
mod ring;
mod stats;
mod store;
mod value;


use std::time::Duration;

// Re-export public types
pub use heap::HeapQueue;
pub use queue::{EvictionQueue, QueueKind};
pub use ring::{RingQueue, RING_DEFAULT_CAPACITY, RING_MINIMUM_GROW};
pub use stats::Stats;
pub use store::{LocalCache, LocalCacheBuilder};
pub use value::{
    with_expires_at, with_on_remove, with_timestamp, with_ttl, RemovalReason, RemoveHandler,
    Value, ValueOption,
};

// == Public Constants ==
/// How often the background sweeper runs unless configured otherwise
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(500);
