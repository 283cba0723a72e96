//! Shared building blocks for the attribution SDK: tracker configuration,
//! the error taxonomy, and the typed event options / response payloads that
//! flow between the identifier store and the event dispatcher.

pub mod config;
pub mod error;
pub mod types;

pub use config::{OrganicConfig, TrackerConfig};
pub use error::{AttributionError, AttributionResult};
pub use types::{
    non_empty, ClickResponse, ConversionResponse, ConversionResult, EventKind, EventOptions,
    ImpressionResponse, TrackingResponse,
};
