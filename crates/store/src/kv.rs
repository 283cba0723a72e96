//! The storage capability the identifier engine is written against.

use std::sync::Arc;

use attribution_core::{AttributionError, AttributionResult};
use chrono::{DateTime, Duration, Utc};

pub type StoreResult = AttributionResult<()>;

/// Absolute expiry `ttl` from now. A TTL past the representable range is a
/// store error.
pub(crate) fn expiry_after(ttl: Duration, key: &str) -> AttributionResult<DateTime<Utc>> {
    Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| AttributionError::Store(format!("ttl out of range for {key}")))
}

/// Durable string storage keyed by name, with a time-to-live per write.
pub trait KeyValueStore: Send + Sync {
    /// Stored value, or an empty string when absent or expired.
    fn get(&self, key: &str) -> String;

    /// Store `value` under `key` until `ttl` elapses.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> String {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult {
        (**self).set(key, value, ttl)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> String {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult {
        (**self).set(key, value, ttl)
    }
}
