//! File-backed store. Entries are kept as `{value, expiration}` records, the
//! expiration in epoch milliseconds, grouped by the domain they are scoped to.
//! The whole file is rewritten on every `set`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use attribution_core::AttributionError;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::kv::{expiry_after, KeyValueStore, StoreResult};

const DEFAULT_DOMAIN: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    value: String,
    /// Epoch millis; `None` never expires.
    #[serde(default)]
    expiration: Option<i64>,
}

impl FileEntry {
    fn is_live(&self, now_ms: i64) -> bool {
        self.expiration.map_or(true, |exp| exp > now_ms)
    }
}

type Domains = BTreeMap<String, BTreeMap<String, FileEntry>>;

/// Persistent store scoped to one domain within a shared JSON file.
pub struct FileStore {
    path: PathBuf,
    domain: String,
    domains: Mutex<Domains>,
}

impl FileStore {
    /// Open (or create on first write) the store at `path`. Entries are
    /// scoped to `domain`, or to a shared default partition when `None`.
    pub fn open(path: impl AsRef<Path>, domain: Option<&str>) -> Result<Self, AttributionError> {
        let path = path.as_ref().to_path_buf();
        let mut domains: Domains = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                Domains::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            Domains::new()
        };

        let now_ms = Utc::now().timestamp_millis();
        let mut pruned = 0usize;
        for entries in domains.values_mut() {
            let before = entries.len();
            entries.retain(|_, entry| entry.is_live(now_ms));
            pruned += before - entries.len();
        }

        let domain = domain
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DOMAIN)
            .to_string();
        info!(path = %path.display(), domain = %domain, pruned, "opened file store");

        Ok(Self {
            path,
            domain,
            domains: Mutex::new(domains),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn write(&self, domains: &Domains) -> StoreResult {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(domains)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> String {
        let now_ms = Utc::now().timestamp_millis();
        self.domains
            .lock()
            .get(&self.domain)
            .and_then(|entries| entries.get(key))
            .filter(|entry| entry.is_live(now_ms))
            .map(|entry| entry.value.clone())
            .unwrap_or_default()
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult {
        let expiration = expiry_after(ttl, key)?.timestamp_millis();
        let mut domains = self.domains.lock();
        let mut next = domains.clone();
        next.entry(self.domain.clone()).or_default().insert(
            key.to_string(),
            FileEntry {
                value: value.to_string(),
                expiration: Some(expiration),
            },
        );
        debug!(key, domain = %self.domain, "persisting file store");
        // Only a successful write becomes visible to readers.
        self.write(&next)?;
        *domains = next;
        Ok(())
    }
}
