//! Configuration Module
//!
//! Handles loading cache and demo configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::cache::QueueKind;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Background sweep interval in milliseconds
    pub sweep_interval_ms: u64,
    /// Eviction queue backend
    pub eviction_queue: QueueKind,
    /// Number of expiring entries the demo binary seeds
    pub seed_entries: usize,
    /// TTL in milliseconds for seeded entries
    pub seed_ttl_ms: u64,
    /// How often the demo binary logs stats, in seconds
    pub stats_interval_secs: u64,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SWEEP_INTERVAL_MS` - Sweep interval in milliseconds (default: 500)
    /// - `EVICTION_QUEUE` - `heap` or `ring` (default: ring)
    /// - `SEED_ENTRIES` - Entries seeded by the demo (default: 8)
    /// - `SEED_TTL_MS` - TTL of seeded entries in milliseconds (default: 1500)
    /// - `STATS_INTERVAL_SECS` - Demo stats logging interval (default: 1)
    ///
    /// Unparsable values fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sweep_interval_ms: env_or("SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
            eviction_queue: env_or("EVICTION_QUEUE", defaults.eviction_queue),
            seed_entries: env_or("SEED_ENTRIES", defaults.seed_entries),
            seed_ttl_ms: env_or("SEED_TTL_MS", defaults.seed_ttl_ms),
            stats_interval_secs: env_or("STATS_INTERVAL_SECS", defaults.stats_interval_secs),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 500,
            eviction_queue: QueueKind::Ring,
            seed_entries: 8,
            seed_ttl_ms: 1500,
            stats_interval_secs: 1,
        }
    }
}
