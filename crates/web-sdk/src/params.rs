//! Custom parameter providers — asynchronous sources of extra key/value
//! pairs (device fingerprint, client hints) merged into every request.
//!
//! Providers are queried fresh on every event call; nothing is cached here.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

pub type CustomParams = BTreeMap<String, String>;

/// Asynchronous source of extra query parameters.
#[async_trait]
pub trait CustomParamProvider: Send + Sync {
    async fn params(&self) -> CustomParams;
}

#[async_trait]
impl<P: CustomParamProvider + ?Sized> CustomParamProvider for Arc<P> {
    async fn params(&self) -> CustomParams {
        (**self).params().await
    }
}

/// Provider that contributes nothing.
pub struct NoCustomParams;

#[async_trait]
impl CustomParamProvider for NoCustomParams {
    async fn params(&self) -> CustomParams {
        CustomParams::new()
    }
}

/// Fixed set of parameters.
#[derive(Debug, Clone, Default)]
pub struct StaticParams(pub CustomParams);

impl StaticParams {
    pub fn new<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[async_trait]
impl CustomParamProvider for StaticParams {
    async fn params(&self) -> CustomParams {
        self.0.clone()
    }
}

/// Emits the device fingerprint as `effp`. The fingerprint function is
/// opaque; it only has to return a stable string.
pub struct FingerprintParams<F> {
    fingerprint: F,
}

impl<F> FingerprintParams<F>
where
    F: Fn() -> String + Send + Sync,
{
    pub fn new(fingerprint: F) -> Self {
        Self { fingerprint }
    }
}

#[async_trait]
impl<F> CustomParamProvider for FingerprintParams<F>
where
    F: Fn() -> String + Send + Sync,
{
    async fn params(&self) -> CustomParams {
        let fp = (self.fingerprint)();
        let mut params = CustomParams::new();
        if !fp.is_empty() {
            params.insert("effp".to_string(), fp);
        }
        params
    }
}

/// High-entropy user-agent client hints.
#[derive(Debug, Clone, Default)]
pub struct ClientHints {
    pub platform: String,
    pub platform_version: String,
    pub model: String,
}

/// Emits client hints as `sec_ch_ua_*` parameters when available.
#[derive(Debug, Clone, Default)]
pub struct ClientHintsParams {
    hints: Option<ClientHints>,
}

impl ClientHintsParams {
    pub fn new(hints: Option<ClientHints>) -> Self {
        Self { hints }
    }
}

#[async_trait]
impl CustomParamProvider for ClientHintsParams {
    async fn params(&self) -> CustomParams {
        let Some(hints) = &self.hints else {
            return CustomParams::new();
        };
        CustomParams::from([
            ("sec_ch_ua_platform".to_string(), hints.platform.clone()),
            (
                "sec_ch_ua_platform_version".to_string(),
                hints.platform_version.clone(),
            ),
            ("sec_ch_ua_model".to_string(), hints.model.clone()),
        ])
    }
}

/// Awaits each provider in turn; later providers win on key collisions.
#[derive(Default)]
pub struct MergedParams {
    providers: Vec<Arc<dyn CustomParamProvider>>,
}

impl MergedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl CustomParamProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }
}

#[async_trait]
impl CustomParamProvider for MergedParams {
    async fn params(&self) -> CustomParams {
        let mut merged = CustomParams::new();
        for provider in &self.providers {
            merged.extend(provider.params().await);
        }
        merged
    }
}
