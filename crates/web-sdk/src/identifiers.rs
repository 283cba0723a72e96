//! Identifier store — namespaced transaction identifiers with tiered
//! fallback lookup and click history.
//!
//! Identifiers live under `ef_tid_{origin}_{scope}_{id}` keys where origin is
//! `c` (click) or `i` (impression) and scope is `o` (offer) or `a`
//! (advertiser). Click identifiers accumulate as a `|`-delimited history,
//! oldest first; impression identifiers keep only the latest touch. The
//! unscoped `ef_tid_{offer_id}` key predates both axes and is read last.

use attribution_store::KeyValueStore;
use chrono::Duration;
use rand::Rng;
use std::fmt;
use tracing::{debug, warn};

/// Identifiers longer than this are collapsed before being sent.
pub const TRANSACTION_ID_CAP: usize = 332;
const TRUNCATED_PREFIX_LEN: usize = 33;
const TRUNCATED_SUFFIX_LEN: usize = 297;

const HISTORY_DELIMITER: char = '|';
pub const WITNESS_KEY: &str = "ef_witness";

/// Which kind of event issued an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Click,
    Impression,
}

impl Origin {
    fn code(self) -> char {
        match self {
            Origin::Click => 'c',
            Origin::Impression => 'i',
        }
    }
}

/// What an identifier is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Offer,
    Advertiser,
}

impl Scope {
    fn code(self) -> char {
        match self {
            Scope::Offer => 'o',
            Scope::Advertiser => 'a',
        }
    }
}

/// One identifier namespace: (origin, scope, scope id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Namespace<'a> {
    pub origin: Origin,
    pub scope: Scope,
    pub scope_id: &'a str,
}

impl<'a> Namespace<'a> {
    pub fn new(origin: Origin, scope: Scope, scope_id: &'a str) -> Self {
        Self {
            origin,
            scope,
            scope_id,
        }
    }

    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Namespace<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ef_tid_{}_{}_{}",
            self.origin.code(),
            self.scope.code(),
            self.scope_id
        )
    }
}

/// Unscoped per-offer key written by earlier SDK generations.
pub fn legacy_key(offer_id: &str) -> String {
    format!("ef_tid_{offer_id}")
}

/// Per-offer session uniqueness marker key.
pub fn session_key(offer_id: &str) -> String {
    format!("ef_session_{offer_id}")
}

/// What a conversion knows about the visit it belongs to.
#[derive(Debug, Clone, Copy, Default)]
pub struct LookupCriteria<'a> {
    pub offer_id: Option<&'a str>,
    pub advertiser_id: Option<&'a str>,
}

/// Collapse an identifier over [`TRANSACTION_ID_CAP`] characters to its
/// first 33 and last 297 characters.
pub fn truncate_transaction_id(id: &str) -> String {
    let len = id.chars().count();
    if len <= TRANSACTION_ID_CAP {
        return id.to_string();
    }
    id.chars()
        .take(TRUNCATED_PREFIX_LEN)
        .chain(id.chars().skip(len - TRUNCATED_SUFFIX_LEN))
        .collect()
}

/// Wire nonce for the session uniqueness marker: even when the click is the
/// first of its session, odd when it repeats one.
pub fn uniqueness_nonce<R: Rng + ?Sized>(rng: &mut R, repeat: bool) -> u32 {
    let value: u32 = rng.gen_range(0..100);
    if repeat {
        value * 2 + 1
    } else if value % 2 == 0 {
        value
    } else {
        value + 1
    }
}

fn last_in_history(raw: &str) -> &str {
    raw.rsplit(HISTORY_DELIMITER).next().unwrap_or(raw)
}

/// Namespaced identifier storage over an injected [`KeyValueStore`].
pub struct IdentifierStore<S> {
    store: S,
    identifier_ttl: Duration,
}

impl<S: KeyValueStore> IdentifierStore<S> {
    pub fn new(store: S, identifier_ttl: Duration) -> Self {
        Self {
            store,
            identifier_ttl,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn set_identifier_ttl(&mut self, ttl: Duration) {
        self.identifier_ttl = ttl;
    }

    /// Full history for a namespace, oldest first.
    pub fn history(&self, namespace: Namespace<'_>) -> Vec<String> {
        let raw = self.store.get(&namespace.storage_key());
        if raw.is_empty() {
            return Vec::new();
        }
        raw.split(HISTORY_DELIMITER).map(str::to_string).collect()
    }

    /// Most recent identifier in a namespace. History-formatted values are
    /// tolerated for both origins.
    pub fn latest(&self, namespace: Namespace<'_>) -> String {
        let raw = self.store.get(&namespace.storage_key());
        last_in_history(&raw).to_string()
    }

    /// Per-offer lookup: click, then impression, then the legacy key.
    pub fn transaction_id(&self, offer_id: &str) -> String {
        let tid = self.latest(Namespace::new(Origin::Click, Scope::Offer, offer_id));
        if !tid.is_empty() {
            return tid;
        }
        let tid = self.latest(Namespace::new(Origin::Impression, Scope::Offer, offer_id));
        if !tid.is_empty() {
            return tid;
        }
        self.store.get(&legacy_key(offer_id))
    }

    /// Per-advertiser lookup: click, then impression.
    pub fn advertiser_transaction_id(&self, advertiser_id: &str) -> String {
        let tid = self.latest(Namespace::new(Origin::Click, Scope::Advertiser, advertiser_id));
        if !tid.is_empty() {
            return tid;
        }
        self.latest(Namespace::new(Origin::Impression, Scope::Advertiser, advertiser_id))
    }

    /// Conversion-time resolution in strict fallback order. An empty string
    /// means no known identifier.
    pub fn resolve(&self, criteria: LookupCriteria<'_>) -> String {
        if let Some(offer_id) = criteria.offer_id {
            return self.transaction_id(offer_id);
        }

        if let Some(advertiser_id) = criteria.advertiser_id {
            let tid = self.advertiser_transaction_id(advertiser_id);
            if !tid.is_empty() {
                return tid;
            }
        }

        // Legacy key with no offer id, kept as a last resort.
        self.store.get(&legacy_key(""))
    }

    /// Store a newly issued identifier. Clicks extend the namespace history;
    /// impressions replace it. A missing scope id skips the write.
    pub fn record(&self, origin: Origin, scope: Scope, scope_id: Option<&str>, new_id: &str) {
        let Some(scope_id) = scope_id.filter(|id| !id.is_empty()) else {
            debug!(?origin, ?scope, "no scope id in response, skipping identifier write");
            return;
        };
        if new_id.is_empty() {
            return;
        }

        let namespace = Namespace::new(origin, scope, scope_id);
        let key = namespace.storage_key();
        let value = match origin {
            Origin::Click => {
                let existing = self.store.get(&key);
                if existing.is_empty() {
                    new_id.to_string()
                } else {
                    format!("{existing}{HISTORY_DELIMITER}{new_id}")
                }
            }
            Origin::Impression => new_id.to_string(),
        };

        if let Err(e) = self.store.set(&key, &value, self.identifier_ttl) {
            warn!(key = %key, error = %e, "failed to persist transaction id");
        }
    }

    /// Record one issued identifier under both scopes of a response.
    pub fn record_response(
        &self,
        origin: Origin,
        offer_id: Option<&str>,
        advertiser_id: Option<&str>,
        new_id: &str,
    ) {
        self.record(origin, Scope::Offer, offer_id, new_id);
        self.record(origin, Scope::Advertiser, advertiser_id, new_id);
    }

    /// Whether any click has ever completed.
    pub fn has_witness(&self) -> bool {
        !self.store.get(WITNESS_KEY).is_empty()
    }

    pub fn mark_witness(&self) {
        if let Err(e) = self.store.set(WITNESS_KEY, "1", self.identifier_ttl) {
            warn!(error = %e, "failed to persist session witness");
        }
    }

    /// Whether a click for this offer already happened in the current session.
    pub fn is_session_repeat(&self, offer_id: &str) -> bool {
        !self.store.get(&session_key(offer_id)).is_empty()
    }

    pub fn mark_session(&self, offer_id: &str, duration: Duration) {
        if offer_id.is_empty() {
            return;
        }
        if let Err(e) = self.store.set(&session_key(offer_id), "1", duration) {
            warn!(offer_id, error = %e, "failed to persist session marker");
        }
    }
}
