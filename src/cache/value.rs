//! Cache Value Module
//!
//! Defines the record stored for each key, the options used to build it,
//! and the reasons a value can leave the cache.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Callback invoked once when a value leaves the cache.
pub type RemoveHandler<K> = Arc<dyn Fn(&K, RemovalReason) + Send + Sync>;

// == Removal Reason ==
/// Why a value was removed from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalReason {
    /// The value's expiration passed and a sweep collected it
    Expired,
    /// The value was removed explicitly (`remove` or `reset`)
    Removed,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalReason::Expired => f.write_str("expired"),
            RemovalReason::Removed => f.write_str("removed"),
        }
    }
}

// == Value ==
/// A single cached record.
///
/// Values are shared between the cache map and the eviction queue as
/// `Arc<Value>`, so they are never mutated after insertion; an overwrite
/// installs a new handle in both places.
pub struct Value<K, V> {
    /// The key the value is stored under
    pub key: K,
    /// The stored payload
    pub value: V,
    /// Creation (or last write) instant
    pub timestamp: DateTime<Utc>,
    /// Absolute expiration, None = never expires
    pub expires: Option<DateTime<Utc>>,
    /// Optional removal callback
    pub on_remove: Option<RemoveHandler<K>>,
}

impl<K, V> Value<K, V> {
    // == Constructor ==
    /// Creates a value stamped with the current time and no expiration.
    pub fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            timestamp: Utc::now(),
            expires: None,
            on_remove: None,
        }
    }

    // == Apply Options ==
    /// Applies options in order; later options overwrite earlier ones.
    pub fn with_options<I>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = ValueOption<K>>,
    {
        for option in options {
            option.apply(&mut self);
        }
        self
    }

    // == Is Expired ==
    /// Returns true if the value has an expiration strictly before `now`.
    ///
    /// Values without an expiration never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires, Some(expires) if expires < now)
    }

    /// Orders two values by expiration, treating `None` as later than any instant.
    pub fn expires_before(&self, other: &Self) -> bool {
        match (self.expires, other.expires) {
            (Some(a), Some(b)) => a < b,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Value<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("timestamp", &self.timestamp)
            .field("expires", &self.expires)
            .field("on_remove", &self.on_remove.is_some())
            .finish()
    }
}

// == Value Options ==
/// A mutator applied to a freshly built [`Value`] before insertion.
pub enum ValueOption<K> {
    /// Expire `ttl` after the value's timestamp
    Ttl(Duration),
    /// Expire at an absolute instant
    ExpiresAt(DateTime<Utc>),
    /// Override the creation timestamp
    Timestamp(DateTime<Utc>),
    /// Attach a removal callback
    OnRemove(RemoveHandler<K>),
}

impl<K> ValueOption<K> {
    /// Applies the option to a value.
    ///
    /// A TTL is added to the timestamp as it is when the option runs, so
    /// `with_timestamp` must come first for the TTL to be relative to it.
    pub fn apply<V>(self, value: &mut Value<K, V>) {
        match self {
            ValueOption::Ttl(ttl) => {
                value.expires = chrono::Duration::from_std(ttl)
                    .ok()
                    .and_then(|ttl| value.timestamp.checked_add_signed(ttl));
            }
            ValueOption::ExpiresAt(expires) => value.expires = Some(expires),
            ValueOption::Timestamp(timestamp) => value.timestamp = timestamp,
            ValueOption::OnRemove(handler) => value.on_remove = Some(handler),
        }
    }
}

impl<K> fmt::Debug for ValueOption<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueOption::Ttl(ttl) => f.debug_tuple("Ttl").field(ttl).finish(),
            ValueOption::ExpiresAt(at) => f.debug_tuple("ExpiresAt").field(at).finish(),
            ValueOption::Timestamp(ts) => f.debug_tuple("Timestamp").field(ts).finish(),
            ValueOption::OnRemove(_) => f.write_str("OnRemove(..)"),
        }
    }
}

/// Sets the expiration to the value's timestamp plus `ttl`.
pub fn with_ttl<K>(ttl: Duration) -> ValueOption<K> {
    ValueOption::Ttl(ttl)
}

/// Sets an absolute expiration.
pub fn with_expires_at<K>(expires: DateTime<Utc>) -> ValueOption<K> {
    ValueOption::ExpiresAt(expires)
}

/// Overrides the creation timestamp.
pub fn with_timestamp<K>(timestamp: DateTime<Utc>) -> ValueOption<K> {
    ValueOption::Timestamp(timestamp)
}

/// Attaches a callback run once, outside the cache lock, when the value is removed.
pub fn with_on_remove<K, F>(handler: F) -> ValueOption<K>
where
    F: Fn(&K, RemovalReason) + Send + Sync + 'static,
{
    ValueOption::OnRemove(Arc::new(handler))
}
