use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AttributionError, AttributionResult};
use crate::types::EventOptions;

/// Tracker configuration. Loaded from environment variables with the prefix
/// `ATTRIBUTION__` or built directly by the embedding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Base URL of the tracking endpoint, e.g. `https://www.trk.example`.
    #[serde(default)]
    pub tracking_domain: String,
    /// Top-level domain identifiers are scoped to, when the store supports it.
    #[serde(default)]
    pub tld: Option<String>,
    #[serde(default)]
    pub organic: Option<OrganicConfig>,
    #[serde(default = "default_identifier_ttl_days")]
    pub identifier_ttl_days: u32,
    #[serde(default = "default_session_hours")]
    pub default_session_hours: u32,
}

/// Fallback offer/affiliate pair used to synthesize organic clicks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganicConfig {
    #[serde(default)]
    pub offer_id: Option<String>,
    #[serde(default)]
    pub affiliate_id: Option<String>,
    /// Extra click options layered over the page-derived defaults.
    #[serde(default)]
    pub options: Option<EventOptions>,
}

fn default_identifier_ttl_days() -> u32 {
    30
}
fn default_session_hours() -> u32 {
    30 * 24
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tracking_domain: String::new(),
            tld: None,
            organic: None,
            identifier_ttl_days: default_identifier_ttl_days(),
            default_session_hours: default_session_hours(),
        }
    }
}

impl TrackerConfig {
    pub fn new(tracking_domain: impl Into<String>) -> Self {
        Self {
            tracking_domain: tracking_domain.into(),
            ..Default::default()
        }
    }

    pub fn with_tld(mut self, tld: impl Into<String>) -> Self {
        self.tld = Some(tld.into());
        self
    }

    pub fn with_organic(mut self, organic: OrganicConfig) -> Self {
        self.organic = Some(organic);
        self
    }

    /// Load configuration from `ATTRIBUTION__*` environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("ATTRIBUTION")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Check that the configuration can drive a tracker.
    pub fn validate(&self) -> AttributionResult<()> {
        if self.tracking_domain.trim().is_empty() {
            return Err(AttributionError::Config(
                "tracking_domain must not be empty".to_string(),
            ));
        }
        if self.identifier_ttl_days == 0 {
            return Err(AttributionError::Config(
                "identifier_ttl_days must be positive".to_string(),
            ));
        }
        if let Some(organic) = &self.organic {
            if !organic.is_complete() {
                warn!(
                    "Unable to setup organic tracking. Missing \"organic.offer_id\" or \"organic.affiliate_id\" parameter."
                );
            }
        }
        Ok(())
    }

    /// Organic configuration, only when both fallback ids are present.
    pub fn organic_enabled(&self) -> Option<&OrganicConfig> {
        self.organic.as_ref().filter(|o| o.is_complete())
    }
}

impl OrganicConfig {
    pub fn new(offer_id: impl Into<String>, affiliate_id: impl Into<String>) -> Self {
        Self {
            offer_id: Some(offer_id.into()),
            affiliate_id: Some(affiliate_id.into()),
            options: None,
        }
    }

    pub fn with_options(mut self, options: EventOptions) -> Self {
        self.options = Some(options);
        self
    }

    fn is_complete(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        present(&self.offer_id) && present(&self.affiliate_id)
    }
}
