//! Query assembler — maps typed event options onto the canonical,
//! ordered set of outbound query parameters for each event type.
//!
//! Assembly order matters: custom provider params go in first so every named
//! rule overrides them, free-form `parameters` go in last and override
//! everything, and fingerprint removal runs after both.

use attribution_core::EventOptions;
use url::Url;

use crate::page::Page;
use crate::params::CustomParams;

/// Ordered query parameters with `URLSearchParams`-style `set` semantics:
/// setting an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.pairs.iter().position(|(k, _)| k == name) {
            Some(idx) => {
                self.pairs[idx].1 = value;
                let mut seen = false;
                self.pairs.retain(|(k, _)| {
                    if k != name {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => self.pairs.push((name.to_string(), value)),
        }
    }

    /// Set only when the option is present. Present-but-empty is still sent.
    pub fn set_opt(&mut self, name: &str, value: &Option<String>) {
        if let Some(value) = value {
            self.set(name, value.clone());
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.pairs.retain(|(k, _)| k != name);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.pairs.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `application/x-www-form-urlencoded` rendering.
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }

    /// Replace the query of `url` with these parameters.
    pub fn apply_to(&self, url: &mut Url) {
        if self.pairs.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&self.to_query_string()));
        }
    }

    fn merge_custom(&mut self, custom: &CustomParams) {
        for (name, value) in custom {
            self.set(name, value.clone());
        }
    }
}

/// Option field, page-URL fallback name, and wire name for the ad-network
/// click ids.
const CLICK_ID_FIELDS: [(&str, &str); 4] = [
    ("fbclid", "fbclid"),
    ("gclid", "gclid"),
    ("ttclid", "ttclid"),
    ("sccid", "ScCid"),
];

/// Builds query parameters for each event type against a page context.
pub struct QueryAssembler<'a, P: Page + ?Sized> {
    page: &'a P,
}

impl<'a, P: Page + ?Sized> QueryAssembler<'a, P> {
    pub fn new(page: &'a P) -> Self {
        Self { page }
    }

    pub fn impression(&self, options: &EventOptions, custom: &CustomParams) -> QueryParams {
        let mut params = QueryParams::new();
        params.merge_custom(custom);

        params.set("oid", or_empty(&options.offer_id));
        params.set("affid", or_empty(&options.affiliate_id));
        params.set("async", "json");

        set_sub_fields(&mut params, options);
        set_adv_fields(&mut params, options);
        params.set_opt("source_id", &options.source_id);
        params.set_opt("creative_id", &options.creative_id);
        self.set_click_ids(&mut params, options);
        params.set_opt("__cc", &options.coupon_code);

        finish(&mut params, options);
        params
    }

    /// Click parameters. `uniqueness` is the session nonce, sent only when
    /// the click names an offer.
    pub fn click(
        &self,
        options: &EventOptions,
        custom: &CustomParams,
        uniqueness: Option<u32>,
    ) -> QueryParams {
        let mut params = QueryParams::new();
        params.merge_custom(custom);

        params.set("_ef_transaction_id", or_empty(&options.transaction_id));
        params.set("oid", or_empty(&options.offer_id));
        params.set("affid", or_empty(&options.affiliate_id));
        params.set("__cc", or_empty(&options.coupon_code));
        params.set("async", "json");

        params.set_opt("uid", &options.uid);
        set_sub_fields(&mut params, options);
        set_adv_fields(&mut params, options);
        params.set_opt("source_id", &options.source_id);
        params.set_opt("creative_id", &options.creative_id);
        if let Some(organic) = options.organic {
            params.set("__organic_click", if organic { "1" } else { "" });
        }
        params.set_opt("cost", &options.cost);
        self.set_click_ids(&mut params, options);

        params.set("__rf", self.page.referrer());
        if options.offer_id.is_some() {
            if let Some(nonce) = uniqueness {
                params.set("__efckuq", nonce.to_string());
            }
        }

        finish(&mut params, options);
        params
    }

    /// Conversion parameters. The caller resolves and caps the transaction
    /// id into `options.transaction_id` beforehand.
    pub fn conversion(&self, options: &EventOptions, custom: &CustomParams) -> QueryParams {
        let mut params = QueryParams::new();
        params.merge_custom(custom);

        params.set("transaction_id", or_empty(&options.transaction_id));
        params.set(
            "event_id",
            options
                .event_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| "0".to_string()),
        );

        params.set_opt("oid", &options.offer_id);
        params.set_opt("affid", &options.affiliate_id);
        params.set_opt("advid", &options.advertiser_id);
        params.set_opt("aid", &options.aid);
        if let Some(adv_event_id) = &options.adv_event_id {
            params.set("adv_event_id", adv_event_id.clone());
            params.remove("event_id");
        }
        params.set_opt("coupon_code", &options.coupon_code);
        params.set_opt("amount", &options.amount);
        set_adv_fields(&mut params, options);
        set_sub_fields(&mut params, options);
        params.set_opt("order_id", &options.order_id);
        params.set_opt("verification_token", &options.verification_token);
        params.set_opt("email", &options.email);
        if let Some(order) = &options.order {
            params.set("order", order.to_string());
        }
        params.set_opt("user_id", &options.user_id);

        finish(&mut params, options);
        params.set("event_source_url", self.page.hostname());
        params
    }

    /// Explicit option first, then the same-named parameter on the page URL.
    fn set_click_ids(&self, params: &mut QueryParams, options: &EventOptions) {
        let explicit = [
            &options.fbclid,
            &options.gclid,
            &options.ttclid,
            &options.sccid,
        ];
        for ((field, url_name), value) in CLICK_ID_FIELDS.iter().zip(explicit) {
            match value {
                Some(value) => params.set(field, value.clone()),
                None => {
                    if let Some(from_page) = self.page.url_parameter(url_name) {
                        params.set(url_name, from_page);
                    }
                }
            }
        }
    }
}

fn or_empty(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn set_sub_fields(params: &mut QueryParams, options: &EventOptions) {
    params.set_opt("sub1", &options.sub1);
    params.set_opt("sub2", &options.sub2);
    params.set_opt("sub3", &options.sub3);
    params.set_opt("sub4", &options.sub4);
    params.set_opt("sub5", &options.sub5);
}

fn set_adv_fields(params: &mut QueryParams, options: &EventOptions) {
    params.set_opt("adv1", &options.adv1);
    params.set_opt("adv2", &options.adv2);
    params.set_opt("adv3", &options.adv3);
    params.set_opt("adv4", &options.adv4);
    params.set_opt("adv5", &options.adv5);
}

/// Free-form parameters win over everything; fingerprint opt-out runs last.
fn finish(params: &mut QueryParams, options: &EventOptions) {
    if let Some(extra) = &options.parameters {
        for (name, value) in extra {
            params.set(name, value.clone());
        }
    }
    if options.disable_fingerprinting {
        params.remove("effp");
    }
}
