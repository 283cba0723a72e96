//! Event options supplied by the embedding page and the payloads returned by
//! the tracking endpoint.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The three tracked event types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Impression,
    Click,
    Conversion,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Impression => "impression",
            EventKind::Click => "click",
            EventKind::Conversion => "conversion",
        }
    }

    /// Path appended to the tracking domain.
    pub fn endpoint(&self) -> &'static str {
        match self {
            EventKind::Impression => "sdk/impression",
            EventKind::Click => "sdk/click",
            EventKind::Conversion => "sdk/conversion",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied options for a single event call. Every field is optional;
/// absent fields are never serialized onto the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventOptions {
    pub offer_id: Option<String>,
    pub affiliate_id: Option<String>,
    pub advertiser_id: Option<String>,
    /// Short alias for the advertiser id accepted on conversions.
    pub aid: Option<String>,
    pub transaction_id: Option<String>,
    pub event_id: Option<String>,
    pub adv_event_id: Option<String>,
    pub uid: Option<String>,

    pub sub1: Option<String>,
    pub sub2: Option<String>,
    pub sub3: Option<String>,
    pub sub4: Option<String>,
    pub sub5: Option<String>,
    pub adv1: Option<String>,
    pub adv2: Option<String>,
    pub adv3: Option<String>,
    pub adv4: Option<String>,
    pub adv5: Option<String>,

    pub source_id: Option<String>,
    pub creative_id: Option<String>,
    pub coupon_code: Option<String>,
    pub cost: Option<String>,
    pub amount: Option<String>,
    pub order_id: Option<String>,
    /// Order details, JSON-encoded onto the wire.
    pub order: Option<serde_json::Value>,
    pub verification_token: Option<String>,
    pub email: Option<String>,
    pub user_id: Option<String>,

    pub fbclid: Option<String>,
    pub gclid: Option<String>,
    pub ttclid: Option<String>,
    pub sccid: Option<String>,

    /// Marks a synthesized organic click.
    pub organic: Option<bool>,
    /// Free-form parameters merged last; they overwrite any named parameter.
    pub parameters: Option<BTreeMap<String, String>>,
    /// Per-call override of the configured tracking domain.
    pub tracking_domain: Option<String>,

    pub disable_fingerprinting: bool,
    pub do_not_track: bool,
}

macro_rules! overlay_fields {
    ($base:ident, $top:ident; $($field:ident),* $(,)?) => {
        $(
            if $top.$field.is_some() {
                $base.$field = $top.$field;
            }
        )*
    };
}

impl EventOptions {
    pub fn for_offer(offer_id: impl Into<String>) -> Self {
        Self {
            offer_id: Some(offer_id.into()),
            ..Default::default()
        }
    }

    /// Layer `top` over `self`: every field present in `top` wins.
    pub fn overlay(mut self, top: EventOptions) -> Self {
        overlay_fields!(self, top;
            offer_id, affiliate_id, advertiser_id, aid, transaction_id, event_id,
            adv_event_id, uid, sub1, sub2, sub3, sub4, sub5, adv1, adv2, adv3, adv4,
            adv5, source_id, creative_id, coupon_code, cost, amount, order_id, order,
            verification_token, email, user_id, fbclid, gclid, ttclid, sccid, organic,
            parameters, tracking_domain,
        );
        self.disable_fingerprinting |= top.disable_fingerprinting;
        self.do_not_track |= top.do_not_track;
        self
    }

    /// Advertiser id from either `advertiser_id` or its `aid` alias.
    pub fn advertiser(&self) -> Option<&str> {
        non_empty(&self.advertiser_id).or_else(|| non_empty(&self.aid))
    }
}

/// `Some` only for a present, non-empty value.
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Response body of a click or impression request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingResponse {
    #[serde(default, deserialize_with = "lenient_string")]
    pub transaction_id: Option<String>,
    /// Offer the event resolved to.
    #[serde(default, deserialize_with = "lenient_string")]
    pub oid: Option<String>,
    /// Advertiser the event resolved to.
    #[serde(default, deserialize_with = "lenient_string")]
    pub aid: Option<String>,
    /// Session window in hours, click only.
    #[serde(default, deserialize_with = "lenient_number")]
    pub session_duration: Option<f64>,
}

pub type ClickResponse = TrackingResponse;
pub type ImpressionResponse = TrackingResponse;

impl TrackingResponse {
    /// The issued identifier when non-empty.
    pub fn issued_transaction_id(&self) -> Option<&str> {
        non_empty(&self.transaction_id)
    }
}

/// Response body of a conversion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionResponse {
    #[serde(default, deserialize_with = "lenient_string")]
    pub conversion_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub transaction_id: Option<String>,
    /// HTML fragment to render into an invisible frame.
    #[serde(default)]
    pub html_pixel: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl ConversionResponse {
    /// Whether the server flagged the conversion as failed.
    pub fn has_error(&self) -> bool {
        match &self.error {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(_) => true,
        }
    }
}

/// What a conversion call resolves to. Blank on any failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub transaction_id: String,
    pub conversion_id: String,
}

impl ConversionResult {
    pub fn is_blank(&self) -> bool {
        self.transaction_id.is_empty() && self.conversion_id.is_empty()
    }
}

impl From<ConversionResponse> for ConversionResult {
    fn from(response: ConversionResponse) -> Self {
        Self {
            transaction_id: response.transaction_id.unwrap_or_default(),
            conversion_id: response.conversion_id.unwrap_or_default(),
        }
    }
}

/// Accepts ids the server sends either as strings or as numbers.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n: &f64| n.is_finite()))
}
