//! End-to-end tracker flows over a canned transport and an in-memory store.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use attribution_sdk::{
    CannedTransport, EventOptions, OrganicConfig, StaticPage, StaticParams, Tracker,
    TrackerConfig,
};
use attribution_store::{KeyValueStore, MemoryStore};
use chrono::Duration;
use serde_json::json;
use url::Url;

struct Harness {
    tracker: Tracker,
    store: Arc<MemoryStore>,
    transport: Arc<CannedTransport>,
    page: Arc<StaticPage>,
}

fn harness_with(config: TrackerConfig, page: StaticPage) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(CannedTransport::new());
    let page = Arc::new(page);
    let tracker = Tracker::new(config, store.clone(), transport.clone())
        .unwrap()
        .with_page(page.clone());
    Harness {
        tracker,
        store,
        transport,
        page,
    }
}

fn harness() -> Harness {
    harness_with(
        TrackerConfig::new("https://trk.example"),
        StaticPage::at("https://shop.example/checkout").with_referrer("https://ref.example/"),
    )
}

fn param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn seed(store: &MemoryStore, key: &str, value: &str) {
    store.set(key, value, Duration::days(30)).unwrap();
}

#[tokio::test]
async fn click_history_accumulates_in_call_order() {
    let h = harness();
    for tid in ["t1", "t2", "t3"] {
        h.transport
            .push_json(json!({"transaction_id": tid, "oid": 42, "aid": 7}));
        let resolved = h.tracker.click(EventOptions::for_offer("42")).await;
        assert_eq!(resolved, tid);
    }

    assert_eq!(h.store.get("ef_tid_c_o_42"), "t1|t2|t3");
    assert_eq!(h.store.get("ef_tid_c_a_7"), "t1|t2|t3");
    assert_eq!(h.store.get("ef_witness"), "1");
    assert_eq!(h.store.get("ef_session_42"), "1");
    assert_eq!(h.tracker.transaction_id("42"), "t3");
    assert_eq!(h.tracker.advertiser_transaction_id("7"), "t3");

    let url = h.transport.last_request().unwrap();
    assert_eq!(url.path(), "/sdk/click");
    assert_eq!(param(&url, "oid").as_deref(), Some("42"));
    assert_eq!(param(&url, "async").as_deref(), Some("json"));
    assert_eq!(param(&url, "__rf").as_deref(), Some("https://ref.example/"));
}

#[tokio::test]
async fn click_uniqueness_nonce_flips_after_first_click() {
    let h = harness();
    h.transport.push_json(json!({"transaction_id": "t1"}));
    h.transport.push_json(json!({"transaction_id": "t2"}));

    h.tracker.click(EventOptions::for_offer("5")).await;
    h.tracker.click(EventOptions::for_offer("5")).await;

    let requests = h.transport.requests();
    let first: u32 = param(&requests[0], "__efckuq").unwrap().parse().unwrap();
    let second: u32 = param(&requests[1], "__efckuq").unwrap().parse().unwrap();
    assert_eq!(first % 2, 0);
    assert_eq!(second % 2, 1);
}

#[tokio::test]
async fn click_response_without_advertiser_skips_that_scope() {
    let h = harness();
    h.transport.push_json(json!({"transaction_id": "t1"}));
    h.tracker.click(EventOptions::for_offer("42")).await;

    assert_eq!(h.store.get("ef_tid_c_o_42"), "t1");
    assert_eq!(h.store.get("ef_tid_c_a_"), "");
    assert_eq!(h.store.get("ef_tid_c_a_undefined"), "");
}

#[tokio::test]
async fn response_offer_id_takes_precedence_for_scope() {
    let h = harness();
    h.transport
        .push_json(json!({"transaction_id": "t1", "oid": "99"}));
    let options = EventOptions {
        coupon_code: Some("SAVE10".into()),
        ..Default::default()
    };
    assert_eq!(h.tracker.click(options).await, "t1");
    assert_eq!(h.store.get("ef_tid_c_o_99"), "t1");
}

#[tokio::test]
async fn impression_keeps_only_latest_identifier() {
    let h = harness();
    h.transport
        .push_json(json!({"transaction_id": "i1", "aid": "7"}));
    h.transport
        .push_json(json!({"transaction_id": "i2", "aid": "7"}));

    assert_eq!(h.tracker.impression(EventOptions::for_offer("42")).await, "i1");
    assert_eq!(h.tracker.impression(EventOptions::for_offer("42")).await, "i2");

    assert_eq!(h.store.get("ef_tid_i_o_42"), "i2");
    assert_eq!(h.store.get("ef_tid_i_a_7"), "i2");
    assert_eq!(h.store.get("ef_witness"), "");

    let url = h.transport.last_request().unwrap();
    assert_eq!(url.path(), "/sdk/impression");
    assert!(param(&url, "_ef_transaction_id").is_none());
}

#[tokio::test]
async fn conversion_uses_latest_click_and_never_writes() {
    let h = harness();
    seed(&h.store, "ef_tid_c_o_42", "A|B");
    seed(&h.store, "ef_tid_i_o_42", "I");
    seed(&h.store, "ef_tid_42", "L");
    h.transport.push_json(json!({
        "conversion_id": "c-1",
        "transaction_id": "B",
        "html_pixel": "<img src=\"https://pixel.example/p.gif\">"
    }));

    let result = h.tracker.conversion(EventOptions::for_offer("42")).await;
    assert_eq!(result.transaction_id, "B");
    assert_eq!(result.conversion_id, "c-1");

    let url = h.transport.last_request().unwrap();
    assert_eq!(url.path(), "/sdk/conversion");
    assert_eq!(param(&url, "transaction_id").as_deref(), Some("B"));
    assert_eq!(param(&url, "event_id").as_deref(), Some("0"));
    assert_eq!(param(&url, "event_source_url").as_deref(), Some("shop.example"));

    assert_eq!(h.store.get("ef_tid_c_o_42"), "A|B");
    assert_eq!(h.store.len(), 3);
    assert_eq!(h.page.rendered_pixels().len(), 1);
}

#[tokio::test]
async fn conversion_caps_oversized_identifier_at_send_time() {
    let h = harness();
    let long: String = (0..400).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    seed(&h.store, "ef_tid_c_o_42", &long);
    h.transport
        .push_json(json!({"conversion_id": "c", "transaction_id": "x"}));

    h.tracker.conversion(EventOptions::for_offer("42")).await;

    let sent = param(&h.transport.last_request().unwrap(), "transaction_id").unwrap();
    assert_eq!(sent.len(), 330);
    assert_eq!(&sent[..33], &long[..33]);
    assert_eq!(&sent[33..], &long[400 - 297..]);
    assert_eq!(h.store.get("ef_tid_c_o_42"), long);
}

#[tokio::test]
async fn conversion_by_advertiser() {
    let h = harness();
    seed(&h.store, "ef_tid_i_a_7", "IMP");
    h.transport
        .push_json(json!({"conversion_id": "c", "transaction_id": "IMP"}));

    let options = EventOptions {
        advertiser_id: Some("7".into()),
        ..Default::default()
    };
    h.tracker.conversion(options).await;

    let url = h.transport.last_request().unwrap();
    assert_eq!(param(&url, "transaction_id").as_deref(), Some("IMP"));
    assert_eq!(param(&url, "advid").as_deref(), Some("7"));
    assert!(param(&url, "oid").is_none());
}

#[tokio::test]
async fn conversion_by_advertiser_falls_back_to_legacy_key() {
    let h = harness();
    seed(&h.store, "ef_tid_", "LEGACY");
    h.transport
        .push_json(json!({"conversion_id": "c", "transaction_id": "LEGACY"}));

    let options = EventOptions {
        advertiser_id: Some("7".into()),
        ..Default::default()
    };
    let result = h.tracker.conversion(options).await;
    assert_eq!(result.transaction_id, "LEGACY");

    let url = h.transport.last_request().unwrap();
    assert_eq!(param(&url, "transaction_id").as_deref(), Some("LEGACY"));
    assert_eq!(param(&url, "advid").as_deref(), Some("7"));
}

#[tokio::test]
async fn click_with_unusable_session_duration_still_resolves() {
    for duration in [json!(1e12), json!("inf"), json!(-5)] {
        let h = harness();
        h.transport.push_json(
            json!({"transaction_id": "t1", "oid": 42, "session_duration": duration}),
        );

        assert_eq!(h.tracker.click(EventOptions::for_offer("42")).await, "t1");
        assert_eq!(h.store.get("ef_tid_c_o_42"), "t1");
        assert_eq!(h.store.get("ef_session_42"), "1");
        assert_eq!(h.store.get("ef_witness"), "1");
    }
}

#[tokio::test]
async fn conversion_without_known_identifier_sends_empty() {
    let h = harness();
    h.transport
        .push_json(json!({"conversion_id": "", "transaction_id": ""}));

    h.tracker.conversion(EventOptions::for_offer("1")).await;
    let url = h.transport.last_request().unwrap();
    assert_eq!(param(&url, "transaction_id").as_deref(), Some(""));
}

#[tokio::test]
async fn conversion_failures_resolve_blank() {
    let h = harness();
    h.transport
        .push_status(500, json!({"conversion_id": "c", "transaction_id": "t"}));
    h.transport
        .push_json(json!({"error": true, "conversion_id": "c", "html_pixel": "<b>"}));
    h.transport.push_failure("connection reset");
    h.transport.push_json(json!("not an object"));

    for _ in 0..4 {
        let options = EventOptions {
            transaction_id: Some("t".into()),
            ..Default::default()
        };
        assert!(h.tracker.conversion(options).await.is_blank());
    }
    assert_eq!(h.transport.request_count(), 4);
    assert!(h.page.rendered_pixels().is_empty());
}

#[tokio::test]
async fn missing_identifying_fields_never_hit_the_network() {
    let h = harness();
    assert_eq!(h.tracker.click(EventOptions::default()).await, "");
    assert_eq!(h.tracker.impression(EventOptions::default()).await, "");
    assert!(h.tracker.conversion(EventOptions::default()).await.is_blank());
    assert_eq!(h.transport.request_count(), 0);
}

#[tokio::test]
async fn do_not_track_skips_every_event() {
    let h = harness();
    let options = EventOptions {
        offer_id: Some("1".into()),
        do_not_track: true,
        ..Default::default()
    };
    assert_eq!(h.tracker.click(options.clone()).await, "");
    assert_eq!(h.tracker.impression(options.clone()).await, "");
    assert!(h.tracker.conversion(options).await.is_blank());
    assert_eq!(h.transport.request_count(), 0);
}

#[tokio::test]
async fn transport_failure_leaves_store_untouched() {
    let h = harness();
    h.transport.push_failure("dns failure");
    assert_eq!(h.tracker.click(EventOptions::for_offer("1")).await, "");
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn disable_fingerprinting_drops_provider_effp() {
    let h = harness();
    let tracker = h
        .tracker
        .with_custom_params(Arc::new(StaticParams::new([("effp", "fp-1"), ("k", "v")])));
    h.transport.push_json(json!({"transaction_id": "t"}));
    h.transport.push_json(json!({"transaction_id": "t"}));

    tracker.click(EventOptions::for_offer("1")).await;
    let options = EventOptions {
        offer_id: Some("1".into()),
        disable_fingerprinting: true,
        ..Default::default()
    };
    tracker.click(options).await;

    let requests = h.transport.requests();
    assert_eq!(param(&requests[0], "effp").as_deref(), Some("fp-1"));
    assert!(param(&requests[1], "effp").is_none());
    assert_eq!(param(&requests[1], "k").as_deref(), Some("v"));
}

#[tokio::test]
async fn free_form_parameters_override_named_ones() {
    let h = harness();
    h.transport.push_json(json!({"transaction_id": "t"}));
    let options = EventOptions {
        offer_id: Some("1".into()),
        affiliate_id: Some("2".into()),
        parameters: Some(BTreeMap::from([("affid".to_string(), "override".to_string())])),
        ..Default::default()
    };
    h.tracker.impression(options).await;
    let url = h.transport.last_request().unwrap();
    assert_eq!(param(&url, "affid").as_deref(), Some("override"));
}

fn organic_harness(url: &str) -> Harness {
    harness_with(
        TrackerConfig::new("https://trk.example").with_organic(OrganicConfig::new("100", "200")),
        StaticPage::at(url).with_referrer("https://search.example/"),
    )
}

#[tokio::test]
async fn organic_click_synthesized_from_page() {
    let h = organic_harness("https://shop.example/landing/summer?gclid=abc&fbclid=xyz");
    h.transport
        .push_json(json!({"transaction_id": "org-1", "oid": 100}));

    assert_eq!(h.tracker.click(EventOptions::default()).await, "org-1");

    let url = h.transport.last_request().unwrap();
    assert_eq!(param(&url, "oid").as_deref(), Some("100"));
    assert_eq!(param(&url, "affid").as_deref(), Some("200"));
    assert_eq!(param(&url, "sub1").as_deref(), Some("Google"));
    assert_eq!(param(&url, "sub2").as_deref(), Some("https://search.example/"));
    assert_eq!(param(&url, "sub3").as_deref(), Some("/landing"));
    assert_eq!(param(&url, "source_id").as_deref(), Some("organic"));
    assert_eq!(param(&url, "__organic_click").as_deref(), Some("1"));
    assert_eq!(param(&url, "gclid").as_deref(), Some("abc"));
    assert_eq!(h.store.get("ef_witness"), "1");
}

#[tokio::test]
async fn organic_click_never_after_witness() {
    let h = organic_harness("https://shop.example/");
    seed(&h.store, "ef_witness", "1");
    assert_eq!(h.tracker.click(EventOptions::default()).await, "");
    assert_eq!(h.transport.request_count(), 0);
}

#[tokio::test]
async fn organic_requires_complete_config() {
    let h = harness_with(
        TrackerConfig::new("https://trk.example").with_organic(OrganicConfig {
            offer_id: Some("100".into()),
            affiliate_id: None,
            options: None,
        }),
        StaticPage::at("https://shop.example/?gclid=abc"),
    );
    assert_eq!(h.tracker.click(EventOptions::default()).await, "");
    assert_eq!(h.transport.request_count(), 0);
}

#[tokio::test]
async fn concurrent_click_and_impression_are_independent() {
    let h = harness();
    h.transport.push_json(json!({"transaction_id": "a"}));
    h.transport.push_json(json!({"transaction_id": "b"}));

    let (click, impression) = tokio::join!(
        h.tracker.click(EventOptions::for_offer("1")),
        h.tracker.impression(EventOptions::for_offer("2")),
    );
    let mut issued = vec![click, impression];
    issued.sort();
    assert_eq!(issued, vec!["a", "b"]);
    assert_eq!(h.transport.request_count(), 2);
}
