//! Transport contract used by strategies and health probes.
//!
//! Strategies never talk to reqwest directly; they go through
//! [`HttpTransport`] so routing (proxy or direct), timeouts, and connection
//! reuse live in one place and tests can substitute an in-memory transport.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use thiserror::Error;
use url::Url;

/// Contract that abstracts the underlying HTTP transport.
///
/// Implementations must release any connection they hold when the returned
/// future is dropped, so callers can abandon a request at an await point.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET, routed through `proxy` when present.
    async fn get(
        &self,
        url: &Url,
        headers: &HeaderMap,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;

    /// POST a JSON document without a proxy.
    async fn post_json(
        &self,
        url: &Url,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

/// Minimal response representation returned by the transport abstraction.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Url,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>, url: Url) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            url,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid proxy `{proxy}`: {reason}")]
    InvalidProxy { proxy: String, reason: String },
    #[error("http transport error: {0}")]
    Transport(String),
}
