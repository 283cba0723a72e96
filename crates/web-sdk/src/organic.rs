//! Organic-click heuristic — synthesizes click options from page context for
//! traffic that arrives without explicit affiliate attribution.

use attribution_core::{EventOptions, OrganicConfig};

use crate::page::Page;

/// Ad-network click-id URL parameters and the source they indicate, in
/// evaluation order. A later match overwrites an earlier one.
const CLICK_ID_SOURCES: [(&[&str], &str); 7] = [
    (&["fbclid"], "Facebook"),
    (&["gclid"], "Google"),
    (&["ttclid"], "Tiktok"),
    (&["sccid"], "Snapchat"),
    (&["MSCLKID", "msclkid"], "Microsoft"),
    (&["OutbrainClickId"], "Outbrain"),
    (&["TCLID"], "Taboola"),
];

/// Facebook click ids with this prefix come from Instagram.
const INSTAGRAM_PREFIX: &str = "PAA";

fn param<P: Page + ?Sized>(page: &P, name: &str) -> Option<String> {
    page.url_parameter(name).filter(|v| !v.is_empty())
}

/// Best guess at the traffic source from ad-network click ids on the URL.
/// Empty when none is present.
pub fn guess_attribution_source<P: Page + ?Sized>(page: &P) -> String {
    let mut source = String::new();
    for (names, network) in CLICK_ID_SOURCES {
        let Some(value) = names.iter().find_map(|name| param(page, name)) else {
            continue;
        };
        source = if network == "Facebook" && value.starts_with(INSTAGRAM_PREFIX) {
            "Instagram".to_string()
        } else {
            network.to_string()
        };
    }
    source
}

/// Click options derived from the page alone. Explicit `sub1`..`sub5` and
/// `source_id` URL parameters take precedence over the derived values.
pub fn organic_defaults<P: Page + ?Sized>(page: &P) -> EventOptions {
    let pathname = page.pathname();
    let first_segment = pathname.split('/').nth(1).unwrap_or_default();

    EventOptions {
        sub1: Some(param(page, "sub1").unwrap_or_else(|| guess_attribution_source(page))),
        sub2: Some(param(page, "sub2").unwrap_or_else(|| page.referrer())),
        sub3: Some(param(page, "sub3").unwrap_or_else(|| format!("/{first_segment}"))),
        sub4: Some(param(page, "sub4").unwrap_or_else(|| pathname.clone())),
        sub5: Some(param(page, "sub5").unwrap_or_else(|| page.search())),
        source_id: Some(param(page, "source_id").unwrap_or_else(|| "organic".to_string())),
        transaction_id: page.url_parameter("_ef_transaction_id"),
        organic: Some(true),
        ..Default::default()
    }
}

/// Full organic click: page defaults, then configured options, then the
/// configured offer and affiliate.
pub fn synthesize_click<P: Page + ?Sized>(config: &OrganicConfig, page: &P) -> EventOptions {
    organic_defaults(page)
        .overlay(config.options.clone().unwrap_or_default())
        .overlay(EventOptions {
            offer_id: config.offer_id.clone(),
            affiliate_id: config.affiliate_id.clone(),
            ..Default::default()
        })
}
