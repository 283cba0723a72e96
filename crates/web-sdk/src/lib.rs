//! Client-side attribution SDK — correlates a browsing session with
//! affiliate impressions, clicks, and conversions and reports them to a
//! tracking endpoint.
//!
//! # Modules
//!
//! - [`identifiers`] — Namespaced transaction identifiers with tiered fallback
//! - [`query`] — Canonical query parameters per event type
//! - [`tracker`] — Event dispatcher for impression, click, and conversion
//! - [`organic`] — Organic-click synthesis from page context
//! - [`page`] — Page context (location, referrer, pixel rendering)
//! - [`params`] — Asynchronous custom parameter providers
//! - [`transport`] — Outbound GET transport

pub mod identifiers;
pub mod organic;
pub mod page;
pub mod params;
pub mod query;
pub mod tracker;
pub mod transport;

pub use attribution_core::{ConversionResult, EventOptions, OrganicConfig, TrackerConfig};
pub use identifiers::{IdentifierStore, LookupCriteria, Namespace, Origin, Scope};
pub use page::{Page, StaticPage};
pub use params::{
    ClientHints, ClientHintsParams, CustomParamProvider, CustomParams, FingerprintParams,
    MergedParams, NoCustomParams, StaticParams,
};
pub use query::{QueryAssembler, QueryParams};
pub use tracker::Tracker;
pub use transport::{CannedTransport, HttpTransport, Transport, TransportResponse};
