//! Transport — single GET request per event, credentials included, JSON back.

use std::collections::VecDeque;
use std::time::Instant;

use async_trait::async_trait;
use attribution_core::{AttributionError, AttributionResult};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

/// Status and decoded JSON body of a tracking response.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl TransportResponse {
    pub fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Decode the body into the event's expected shape.
    pub fn parse<T: DeserializeOwned>(&self) -> AttributionResult<T> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| AttributionError::Decode(e.to_string()))
    }
}

/// Performs the outbound request for an event.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> AttributionResult<TransportResponse>;
}

/// `reqwest`-backed transport. Cookies set by the tracking domain are kept
/// and replayed, so requests carry credentials like a browser would.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> AttributionResult<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| AttributionError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> AttributionResult<TransportResponse> {
        let start = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AttributionError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AttributionError::Transport(e.to_string()))?;
        debug!(
            path = url.path(),
            status,
            latency_ms = start.elapsed().as_millis() as u64,
            "tracking request completed"
        );

        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| AttributionError::Decode(e.to_string()))?
        };
        Ok(TransportResponse { status, body })
    }
}

/// Transport answering from a queue of prepared responses and recording
/// every requested URL. For tests and offline embedding.
#[derive(Default)]
pub struct CannedTransport {
    responses: Mutex<VecDeque<Result<TransportResponse, String>>>,
    requests: Mutex<Vec<Url>>,
}

impl CannedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, body: serde_json::Value) -> &Self {
        self.responses
            .lock()
            .push_back(Ok(TransportResponse::ok(body)));
        self
    }

    pub fn push_status(&self, status: u16, body: serde_json::Value) -> &Self {
        self.responses
            .lock()
            .push_back(Ok(TransportResponse { status, body }));
        self
    }

    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.responses.lock().push_back(Err(message.into()));
        self
    }

    pub fn requests(&self) -> Vec<Url> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<Url> {
        self.requests.lock().last().cloned()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for CannedTransport {
    async fn get(&self, url: &Url) -> AttributionResult<TransportResponse> {
        self.requests.lock().push(url.clone());
        match self.responses.lock().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(AttributionError::Transport(message)),
            None => Err(AttributionError::Transport(
                "no canned response queued".to_string(),
            )),
        }
    }
}
