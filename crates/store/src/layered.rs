//! Store combinators: dual persistence and value capping.

use chrono::Duration;
use tracing::warn;

use crate::kv::{KeyValueStore, StoreResult};

/// Values longer than this are collapsed before being written.
pub const MAX_STORED_VALUE_LEN: usize = 1650;
const CAPPED_PREFIX_LEN: usize = 33;
const CAPPED_SUFFIX_LEN: usize = 1616;

/// Writes to both backends; reads from the primary, falling back to the
/// secondary when the primary has nothing.
pub struct LayeredStore<P, S> {
    primary: P,
    secondary: S,
}

impl<P: KeyValueStore, S: KeyValueStore> LayeredStore<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P: KeyValueStore, S: KeyValueStore> KeyValueStore for LayeredStore<P, S> {
    fn get(&self, key: &str) -> String {
        let value = self.primary.get(key);
        if !value.is_empty() {
            return value;
        }
        self.secondary.get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult {
        let primary = self.primary.set(key, value, ttl);
        let secondary = self.secondary.set(key, value, ttl);
        if let Err(e) = &primary {
            warn!(key, error = %e, "primary store write failed");
        }
        primary.and(secondary)
    }
}

/// Collapses values over [`MAX_STORED_VALUE_LEN`] characters to their first
/// 33 and last 1616 characters before delegating.
pub struct CappedStore<S> {
    inner: S,
}

impl<S: KeyValueStore> CappedStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: KeyValueStore> KeyValueStore for CappedStore<S> {
    fn get(&self, key: &str) -> String {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult {
        let len = value.chars().count();
        if len <= MAX_STORED_VALUE_LEN {
            return self.inner.set(key, value, ttl);
        }
        let capped: String = value
            .chars()
            .take(CAPPED_PREFIX_LEN)
            .chain(value.chars().skip(len - CAPPED_SUFFIX_LEN))
            .collect();
        self.inner.set(key, &capped, ttl)
    }
}
