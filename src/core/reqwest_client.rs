//! Reqwest-based implementation of the [`HttpTransport`] trait.
//!
//! Keeps one `reqwest::Client` per proxy endpoint (plus one for direct
//! traffic) so connection pools and cookie jars are never shared across
//! network identities.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use reqwest::Client;
use tokio::sync::Mutex;
use url::Url;

use super::transport::{HttpTransport, TransportError, TransportResponse};

/// Reqwest-backed transport with a client per routing key.
pub struct ReqwestTransport {
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Build the direct-route client up front so TLS or resolver setup
    /// problems surface at construction time.
    pub fn try_new() -> Result<Self, reqwest::Error> {
        let direct = Self::client_builder().no_proxy().build()?;
        Ok(Self {
            clients: Mutex::new(HashMap::from([(None, direct)])),
        })
    }

    fn client_builder() -> reqwest::ClientBuilder {
        Client::builder().cookie_store(true)
    }

    async fn client(&self, proxy: Option<&str>) -> Result<Client, TransportError> {
        let mut guard = self.clients.lock().await;
        let key = proxy.map(str::to_string);
        if let Some(client) = guard.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = Self::client_builder();
        builder = match proxy {
            Some(endpoint) => {
                let proxy = reqwest::Proxy::all(endpoint).map_err(|err| {
                    TransportError::InvalidProxy {
                        proxy: endpoint.to_string(),
                        reason: err.to_string(),
                    }
                })?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        let client = builder
            .build()
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        guard.insert(key, client.clone());
        Ok(client)
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &Url,
        headers: &HeaderMap,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let client = self.client(proxy).await?;
        let response = client
            .get(url.as_str())
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| map_error(err, timeout))?;

        to_transport_response(response, timeout).await
    }

    async fn post_json(
        &self,
        url: &Url,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let client = self.client(None).await?;
        let response = client
            .post(url.as_str())
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| map_error(err, timeout))?;

        to_transport_response(response, timeout).await
    }
}

fn map_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        // Strip the URL so tokens carried in query strings never reach logs.
        TransportError::Transport(err.without_url().to_string())
    }
}

async fn to_transport_response(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<TransportResponse, TransportError> {
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let url = response.url().clone();
    let body = response
        .bytes()
        .await
        .map_err(|err| map_error(err, timeout))?;

    Ok(TransportResponse {
        status,
        headers,
        body,
        url,
    })
}
