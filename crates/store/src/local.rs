//! In-process store backed by DashMap for lock-free concurrent access.
//! Suits short-lived embedders and tests; nothing survives the process.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use crate::kv::{expiry_after, KeyValueStore, StoreResult};

struct StoreEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Lock-free in-memory key-value store with per-entry expiry.
#[derive(Clone, Default)]
pub struct MemoryStore {
    store: Arc<DashMap<String, StoreEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove expired entries. Reads already skip them; this reclaims memory.
    pub fn evict_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.store.len();
        self.store.retain(|_, entry| entry.expires_at > now);
        before - self.store.len()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> String {
        let Some(entry) = self.store.get(key) else {
            metrics::counter!("store.memory.miss").increment(1);
            return String::new();
        };
        if entry.expires_at <= Utc::now() {
            drop(entry);
            self.store.remove(key);
            metrics::counter!("store.memory.expired").increment(1);
            return String::new();
        }
        metrics::counter!("store.memory.hit").increment(1);
        entry.value.clone()
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult {
        let expires_at = expiry_after(ttl, key)?;
        self.store.insert(
            key.to_string(),
            StoreEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use attribution_core::AttributionError;

    #[test]
    fn test_get_missing_is_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.get("ef_tid_c_o_1"), "");
    }

    #[test]
    fn test_set_then_get() {
        let store = MemoryStore::new();
        store.set("ef_witness", "1", Duration::days(30)).unwrap();
        assert_eq!(store.get("ef_witness"), "1");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_expired_entry_reads_empty() {
        let store = MemoryStore::new();
        store.set("ef_session_5", "1", Duration::zero()).unwrap();
        assert_eq!(store.get("ef_session_5"), "");
        assert!(store.is_empty());
    }

    #[test]
    fn test_evict_expired() {
        let store = MemoryStore::new();
        store.set("a", "1", Duration::seconds(-1)).unwrap();
        store.set("b", "2", Duration::hours(1)).unwrap();
        assert_eq!(store.evict_expired(), 1);
        assert_eq!(store.get("b"), "2");
    }

    #[test]
    fn test_out_of_range_ttl_is_an_error() {
        let store = MemoryStore::new();
        let result = store.set("k", "v", Duration::days(i64::from(u32::MAX)));
        assert!(matches!(result, Err(AttributionError::Store(_))));
        assert_eq!(store.get("k"), "");
    }

    #[test]
    fn test_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set("k", "v", Duration::hours(1)).unwrap();
        assert_eq!(other.get("k"), "v");
    }
}
