//! Event dispatcher — runs the impression, click, and conversion protocols.
//!
//! Each call is one asynchronous workflow: validate, await the custom
//! parameter provider, assemble the query, issue a single GET, decode the
//! response, update the identifier store, and resolve. Calls never fail
//! towards the caller; every error resolves to an empty identifier or a
//! blank [`ConversionResult`].
//!
//! # Lifecycle
//!
//! Build a [`Tracker`] once with [`Tracker::new`] and keep it for the life of
//! the embedding page or application; [`Tracker::configure`] swaps the
//! configuration in place. Dropping the tracker releases its collaborators.
//! Nothing is buffered in memory, so there is nothing to flush.

use std::sync::Arc;

use attribution_core::{
    non_empty, AttributionError, AttributionResult, ConversionResponse, ConversionResult,
    EventKind, EventOptions, TrackerConfig, TrackingResponse,
};
use attribution_store::KeyValueStore;
use chrono::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::identifiers::{
    truncate_transaction_id, uniqueness_nonce, IdentifierStore, LookupCriteria, Origin,
};
use crate::organic::synthesize_click;
use crate::page::{Page, StaticPage};
use crate::params::{CustomParamProvider, NoCustomParams};
use crate::query::{QueryAssembler, QueryParams};
use crate::transport::{Transport, TransportResponse};

/// Attribution tracker: the public face of the SDK.
pub struct Tracker {
    config: TrackerConfig,
    identifiers: IdentifierStore<Arc<dyn KeyValueStore>>,
    transport: Arc<dyn Transport>,
    page: Arc<dyn Page>,
    custom_params: Arc<dyn CustomParamProvider>,
}

impl Tracker {
    /// Create a tracker over a storage backend and a transport. The page
    /// context defaults to an empty one and no custom parameters are added
    /// until [`with_page`](Self::with_page) / [`with_custom_params`](Self::with_custom_params).
    pub fn new(
        config: TrackerConfig,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
    ) -> AttributionResult<Self> {
        config.validate()?;
        let ttl = Duration::days(i64::from(config.identifier_ttl_days));
        info!(
            tracking_domain = %config.tracking_domain,
            organic = config.organic_enabled().is_some(),
            "attribution tracker initialized"
        );
        Ok(Self {
            config,
            identifiers: IdentifierStore::new(store, ttl),
            transport,
            page: Arc::new(StaticPage::default()),
            custom_params: Arc::new(NoCustomParams),
        })
    }

    pub fn with_page(mut self, page: Arc<dyn Page>) -> Self {
        self.page = page;
        self
    }

    pub fn with_custom_params(mut self, provider: Arc<dyn CustomParamProvider>) -> Self {
        self.custom_params = provider;
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Replace the configuration. An invalid configuration leaves the current
    /// one in place.
    pub fn configure(&mut self, config: TrackerConfig) -> AttributionResult<()> {
        config.validate()?;
        self.identifiers
            .set_identifier_ttl(Duration::days(i64::from(config.identifier_ttl_days)));
        self.config = config;
        Ok(())
    }

    pub fn identifiers(&self) -> &IdentifierStore<Arc<dyn KeyValueStore>> {
        &self.identifiers
    }

    /// Latest known identifier for an offer.
    pub fn transaction_id(&self, offer_id: &str) -> String {
        self.identifiers.transaction_id(offer_id)
    }

    /// Latest known identifier for an advertiser.
    pub fn advertiser_transaction_id(&self, advertiser_id: &str) -> String {
        self.identifiers.advertiser_transaction_id(advertiser_id)
    }

    /// Query parameter from the current page URL.
    pub fn url_parameter(&self, name: &str) -> Option<String> {
        self.page.url_parameter(name)
    }

    /// Track an impression. Resolves to the issued transaction id, or an
    /// empty string.
    pub async fn impression(&self, options: EventOptions) -> String {
        let kind = EventKind::Impression;
        if non_empty(&options.offer_id).is_none() && non_empty(&options.coupon_code).is_none() {
            warn!("Unable to track. Missing \"offer_id\" parameter.");
            metrics::counter!("sdk.events.skipped", "event" => kind.as_str()).increment(1);
            return String::new();
        }
        if options.do_not_track {
            return String::new();
        }

        let custom = self.custom_params.params().await;
        let params = QueryAssembler::new(self.page.as_ref()).impression(&options, &custom);
        let Some(body) = self.dispatch_touch(kind, &options, params).await else {
            return String::new();
        };
        let Some(tid) = body.issued_transaction_id() else {
            debug!(event = %kind, "response carried no transaction id");
            return String::new();
        };

        let offer_scope = non_empty(&body.oid).or(non_empty(&options.offer_id));
        self.identifiers
            .record_response(Origin::Impression, offer_scope, non_empty(&body.aid), tid);
        tid.to_string()
    }

    /// Track a click. Without an offer id, transaction id, or coupon code the
    /// click is synthesized from the page when organic tracking is configured
    /// and no click has completed before.
    pub async fn click(&self, options: EventOptions) -> String {
        let kind = EventKind::Click;
        let opted_out = options.do_not_track;

        let options = if non_empty(&options.offer_id).is_none()
            && non_empty(&options.transaction_id).is_none()
            && non_empty(&options.coupon_code).is_none()
        {
            match self.config.organic_enabled() {
                Some(organic) if !self.identifiers.has_witness() => {
                    debug!("synthesizing organic click");
                    synthesize_click(organic, self.page.as_ref())
                }
                _ => {
                    warn!("Unable to track. Missing \"offer_id\" or \"transaction_id\" parameter.");
                    metrics::counter!("sdk.events.skipped", "event" => kind.as_str())
                        .increment(1);
                    return String::new();
                }
            }
        } else {
            options
        };
        if opted_out {
            return String::new();
        }

        let custom = self.custom_params.params().await;
        let uniqueness = options.offer_id.as_deref().map(|offer_id| {
            let repeat = self.identifiers.is_session_repeat(offer_id);
            uniqueness_nonce(&mut rand::thread_rng(), repeat)
        });
        let params =
            QueryAssembler::new(self.page.as_ref()).click(&options, &custom, uniqueness);
        let Some(body) = self.dispatch_touch(kind, &options, params).await else {
            return String::new();
        };
        let Some(tid) = body.issued_transaction_id() else {
            debug!(event = %kind, "response carried no transaction id");
            return String::new();
        };

        self.identifiers.mark_witness();
        let offer_scope = non_empty(&body.oid).or(non_empty(&options.offer_id));
        if let Some(offer_id) = offer_scope {
            let window =
                session_window(body.session_duration, self.config.default_session_hours);
            self.identifiers.mark_session(offer_id, window);
        }
        self.identifiers
            .record_response(Origin::Click, offer_scope, non_empty(&body.aid), tid);
        tid.to_string()
    }

    /// Track a conversion. The transaction id is resolved from the identifier
    /// store when not supplied and capped before sending. Conversions never
    /// write to the identifier store.
    pub async fn conversion(&self, mut options: EventOptions) -> ConversionResult {
        let kind = EventKind::Conversion;
        if non_empty(&options.transaction_id).is_none()
            && non_empty(&options.offer_id).is_none()
            && options.advertiser().is_none()
            && non_empty(&options.coupon_code).is_none()
        {
            warn!("Unable to track. Missing \"transaction_id\" or \"offer_id\" parameter.");
            metrics::counter!("sdk.events.skipped", "event" => kind.as_str()).increment(1);
            return ConversionResult::default();
        }
        if options.do_not_track {
            return ConversionResult::default();
        }

        if non_empty(&options.transaction_id).is_none() {
            let tid = self.identifiers.resolve(LookupCriteria {
                offer_id: non_empty(&options.offer_id),
                advertiser_id: options.advertiser(),
            });
            options.transaction_id = Some(tid);
        }
        options.transaction_id = options
            .transaction_id
            .as_deref()
            .map(truncate_transaction_id);

        let custom = self.custom_params.params().await;
        let params = QueryAssembler::new(self.page.as_ref()).conversion(&options, &custom);
        let Some(response) = self.send(kind, &options, params).await else {
            return ConversionResult::default();
        };
        if !response.is_ok() {
            warn!(event = %kind, status = response.status, "conversion rejected");
            metrics::counter!("sdk.events.failed", "event" => kind.as_str()).increment(1);
            return ConversionResult::default();
        }
        let body: ConversionResponse = match response.parse() {
            Ok(body) => body,
            Err(e) => {
                warn!(event = %kind, error = %e, "unreadable conversion response");
                metrics::counter!("sdk.events.failed", "event" => kind.as_str()).increment(1);
                return ConversionResult::default();
            }
        };
        if body.has_error() {
            warn!(event = %kind, error = ?body.error, "conversion reported an error");
            metrics::counter!("sdk.events.failed", "event" => kind.as_str()).increment(1);
            return ConversionResult::default();
        }

        if let Some(html) = non_empty(&body.html_pixel) {
            self.page.render_pixel(html);
        }
        ConversionResult::from(body)
    }

    /// Send a click or impression and decode its response body.
    async fn dispatch_touch(
        &self,
        kind: EventKind,
        options: &EventOptions,
        params: QueryParams,
    ) -> Option<TrackingResponse> {
        let response = self.send(kind, options, params).await?;
        match response.parse::<TrackingResponse>() {
            Ok(body) => Some(body),
            Err(e) => {
                error!(event = %kind, status = response.status, error = %e, "unreadable tracking response");
                metrics::counter!("sdk.events.failed", "event" => kind.as_str()).increment(1);
                None
            }
        }
    }

    /// Issue the single GET for an event. Failures are logged and become `None`.
    async fn send(
        &self,
        kind: EventKind,
        options: &EventOptions,
        params: QueryParams,
    ) -> Option<TransportResponse> {
        let mut url = match self.endpoint(kind, options) {
            Ok(url) => url,
            Err(e) => {
                error!(event = %kind, error = %e, "cannot build tracking URL");
                return None;
            }
        };
        params.apply_to(&mut url);

        metrics::counter!("sdk.events.sent", "event" => kind.as_str()).increment(1);
        match self.transport.get(&url).await {
            Ok(response) => {
                debug!(event = %kind, status = response.status, "tracking response received");
                Some(response)
            }
            Err(e) => {
                error!(event = %kind, error = %e, "tracking request failed");
                metrics::counter!("sdk.events.failed", "event" => kind.as_str()).increment(1);
                None
            }
        }
    }

    /// Endpoint URL against the per-call or configured tracking domain.
    fn endpoint(&self, kind: EventKind, options: &EventOptions) -> AttributionResult<Url> {
        let domain = options
            .tracking_domain
            .as_deref()
            .unwrap_or(&self.config.tracking_domain);
        let raw = format!("{}/{}", domain.trim_end_matches('/'), kind.endpoint());
        Url::parse(&raw).map_err(|e| AttributionError::InvalidUrl(format!("{raw}: {e}")))
    }
}

/// Longest session window accepted from the server: one year.
const MAX_SESSION_HOURS: f64 = 24.0 * 366.0;

/// Session window for a click. A missing, non-finite, non-positive, or
/// oversized reported duration falls back to the configured default.
fn session_window(reported_hours: Option<f64>, default_hours: u32) -> Duration {
    reported_hours
        .filter(|hours| hours.is_finite() && *hours > 0.0 && *hours <= MAX_SESSION_HOURS)
        .and_then(|hours| Duration::try_seconds((hours * 3600.0) as i64))
        .unwrap_or_else(|| Duration::hours(i64::from(default_hours)))
}
