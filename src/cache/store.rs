//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with an expiration queue and
//! a background sweeper.

use std::borrow::Borrow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::mem;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::cache::{
    EvictionQueue, QueueKind, RemovalReason, Stats, Value, ValueOption,
    DEFAULT_SWEEP_INTERVAL,
};
use crate::config::Config;
use crate::error::Result;
use crate::tasks::{Interval, Signal};

/// The map and queue, always mutated together under one lock.
struct State<K, V> {
    entries: HashMap<K, Arc<Value<K, V>>>,
    queue: Box<dyn EvictionQueue<K, V>>,
}

impl<K, V> State<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Inserts a new key or replaces an existing one, keeping the queue in step.
    fn upsert(&mut self, value: Arc<Value<K, V>>) {
        match self.entries.entry(value.key.clone()) {
            Entry::Occupied(mut slot) => {
                slot.insert(Arc::clone(&value));
                self.queue.fix(value);
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&value));
                self.queue.push(value);
            }
        }
    }
}

struct Shared<K, V> {
    state: RwLock<State<K, V>>,
}

impl<K, V> Shared<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Removes every value that expired before `now`, then runs their handlers.
    fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut expired: Vec<Arc<Value<K, V>>> = Vec::new();
        {
            let mut guard = self.state.write();
            let State { entries, queue } = &mut *guard;
            queue.consume(&mut |value| {
                if value.is_expired_at(now) {
                    expired.push(Arc::clone(value));
                    true
                } else {
                    false
                }
            });
            for value in &expired {
                entries.remove(&value.key);
            }
        }

        // handlers run outside the critical section so they may re-enter the cache
        for value in &expired {
            if let Some(handler) = &value.on_remove {
                handler(&value.key, RemovalReason::Expired);
            }
        }
        expired.len()
    }
}

// == Local Cache ==
/// An in-process cache whose entries expire by time.
///
/// Reads take a shared lock, writes an exclusive one. Expired entries stay
/// readable until a sweep removes them: either an explicit [`LocalCache::sweep`]
/// or the background sweeper started with [`LocalCache::start`].
///
/// # Example
/// ```
/// use std::time::Duration;
/// use local_cache::{with_ttl, LocalCache};
///
/// let cache: LocalCache<&str, String> = LocalCache::new();
/// cache.set("greeting", "hello".to_string(), [with_ttl(Duration::from_secs(60))]);
/// assert_eq!(cache.get("greeting"), Some("hello".to_string()));
/// ```
pub struct LocalCache<K, V> {
    shared: Arc<Shared<K, V>>,
    sweeper: Interval,
    queue_kind: QueueKind,
}

impl<K, V> LocalCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache with a ring queue and a 500ms sweep interval.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts a builder for choosing the sweep interval and queue backend.
    pub fn builder() -> LocalCacheBuilder<K, V> {
        LocalCacheBuilder::default()
    }

    /// Creates a cache from loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::builder()
            .sweep_interval(Duration::from_millis(config.sweep_interval_ms))
            .queue(config.eviction_queue)
            .build()
    }

    fn with_parts(sweep_interval: Duration, queue_kind: QueueKind) -> Self {
        let shared = Arc::new(Shared {
            state: RwLock::new(State {
                entries: HashMap::new(),
                queue: queue_kind.build(),
            }),
        });

        let weak: Weak<Shared<K, V>> = Arc::downgrade(&shared);
        let sweeper = Interval::new(sweep_interval, move || {
            if let Some(shared) = weak.upgrade() {
                let removed = shared.sweep(Utc::now());
                if removed > 0 {
                    info!("Sweep: removed {} expired entries", removed);
                } else {
                    debug!("Sweep: no expired entries found");
                }
            }
            Ok(())
        });

        Self {
            shared,
            sweeper,
            queue_kind,
        }
    }

    // == Set ==
    /// Stores a value, replacing any existing value for the key.
    ///
    /// Options are applied in order to a value stamped with the current time
    /// and no expiration. Replacing a value does not run the old value's
    /// removal handler.
    pub fn set<I>(&self, key: K, value: V, options: I)
    where
        I: IntoIterator<Item = ValueOption<K>>,
    {
        let value = Arc::new(Value::new(key, value).with_options(options));
        self.shared.state.write().upsert(value);
    }

    // == Get ==
    /// Returns a copy of the value for `key`.
    ///
    /// Expiration is not checked here; an expired value is returned until a
    /// sweep removes it.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared
            .state
            .read()
            .entries
            .get(key)
            .map(|value| value.value.clone())
    }

    // == Get Or Set ==
    /// Returns the value for `key`, computing and storing it with `provider` on a miss.
    ///
    /// The boolean is true when the returned value was already cached. The
    /// provider runs without any lock held, so racing callers may all run
    /// their providers; the first to store wins and every later caller gets
    /// the stored value back with `true`. A provider error is returned
    /// unchanged and nothing is stored.
    pub fn get_or_set<F, E, I>(
        &self,
        key: K,
        provider: F,
        options: I,
    ) -> std::result::Result<(V, bool), E>
    where
        F: FnOnce() -> std::result::Result<V, E>,
        I: IntoIterator<Item = ValueOption<K>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok((value, true));
        }

        let value = provider()?;

        let mut state = self.shared.state.write();
        // another writer may have stored the key while the provider ran
        if let Some(existing) = state.entries.get(&key) {
            return Ok((existing.value.clone(), true));
        }
        let stored = Arc::new(Value::new(key, value.clone()).with_options(options));
        state.upsert(stored);
        Ok((value, false))
    }

    // == Has ==
    /// Returns true if `key` is present (expired or not).
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared.state.read().entries.contains_key(key)
    }

    // == Remove ==
    /// Removes `key`, returning its value.
    ///
    /// The value's removal handler runs with [`RemovalReason::Removed`] after
    /// the lock is released.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = {
            let mut state = self.shared.state.write();
            let removed = state.entries.remove(key)?;
            state.queue.remove(&removed.key);
            removed
        };

        if let Some(handler) = &removed.on_remove {
            handler(&removed.key, RemovalReason::Removed);
        }
        Some(removed.value.clone())
    }

    // == Reset ==
    /// Removes every entry, running removal handlers with [`RemovalReason::Removed`]
    /// outside the lock.
    pub fn reset(&self) {
        let removed: Vec<Arc<Value<K, V>>> = {
            let mut state = self.shared.state.write();
            let removed = state
                .entries
                .drain()
                .map(|(_, value)| value)
                .filter(|value| value.on_remove.is_some())
                .collect();
            state.queue.reset();
            removed
        };
        debug!("Reset: {} removal handlers to run", removed.len());

        for value in &removed {
            if let Some(handler) = &value.on_remove {
                handler(&value.key, RemovalReason::Removed);
            }
        }
    }

    // == Sweep ==
    /// Removes every entry whose expiration is before now.
    ///
    /// Returns the number of entries removed. Removal handlers run with
    /// [`RemovalReason::Expired`] after the lock is released.
    pub fn sweep(&self) -> Result<usize> {
        Ok(self.shared.sweep(Utc::now()))
    }

    /// Like [`LocalCache::sweep`], against an explicit instant.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        self.shared.sweep(now)
    }

    // == Stats ==
    /// Returns a snapshot of entry count, approximate size and oldest age.
    pub fn stats(&self) -> Stats {
        let state = self.shared.state.read();
        let now = Utc::now();
        let entry_size = mem::size_of::<Value<K, V>>();

        let mut stats = Stats::new();
        for value in state.entries.values() {
            let age = (now - value.timestamp).to_std().unwrap_or_default();
            stats.record_entry(entry_size, age);
        }
        stats
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.shared.state.read().entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the key that the next sweep will consider first.
    pub fn next_to_expire(&self) -> Option<K> {
        self.shared
            .state
            .read()
            .queue
            .peek()
            .map(|value| value.key.clone())
    }

    /// The eviction queue backend this cache was built with.
    pub fn queue_kind(&self) -> QueueKind {
        self.queue_kind
    }

    /// The period of the background sweeper.
    pub fn sweep_interval(&self) -> Duration {
        self.sweeper.every()
    }

    // == Lifecycle ==
    /// Starts the background sweeper on the current tokio runtime.
    pub fn start(&self) -> Result<()> {
        self.sweeper.start()
    }

    /// Stops the background sweeper.
    pub fn stop(&self) -> Result<()> {
        self.sweeper.stop()
    }

    /// Raised once the sweeper is running.
    pub fn notify_started(&self) -> Signal {
        self.sweeper.notify_started()
    }

    /// Raised once the sweeper has exited.
    pub fn notify_stopped(&self) -> Signal {
        self.sweeper.notify_stopped()
    }
}

impl<K, V> Default for LocalCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl<K, V> LocalCache<K, V> {
    pub(crate) fn queue_len(&self) -> usize {
        self.shared.state.read().queue.len()
    }
}

// == Builder ==
/// Builder for a [`LocalCache`].
///
/// # Example
/// ```
/// use std::time::Duration;
/// use local_cache::{LocalCache, QueueKind};
///
/// let cache: LocalCache<u64, String> = LocalCache::builder()
///     .sweep_interval(Duration::from_secs(1))
///     .queue(QueueKind::Heap)
///     .build();
/// assert_eq!(cache.queue_kind(), QueueKind::Heap);
/// ```
pub struct LocalCacheBuilder<K, V> {
    sweep_interval: Duration,
    queue: QueueKind,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Default for LocalCacheBuilder<K, V> {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            queue: QueueKind::default(),
            _marker: PhantomData,
        }
    }
}

impl<K, V> fmt::Debug for LocalCacheBuilder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCacheBuilder")
            .field("sweep_interval", &self.sweep_interval)
            .field("queue", &self.queue)
            .finish()
    }
}

impl<K, V> LocalCacheBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Sets how often the background sweeper runs (default: 500ms).
    pub fn sweep_interval(mut self, every: Duration) -> Self {
        self.sweep_interval = every;
        self
    }

    /// Sets the eviction queue backend (default: ring).
    pub fn queue(mut self, kind: QueueKind) -> Self {
        self.queue = kind;
        self
    }

    pub fn build(self) -> LocalCache<K, V> {
        LocalCache::with_parts(self.sweep_interval, self.queue)
    }
}
