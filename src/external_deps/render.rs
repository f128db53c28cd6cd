//! Client for a remote headless-rendering service.
//!
//! The service loads the page in its own browser, waits until a readiness
//! predicate holds (or the in-page budget runs out), and returns the final
//! HTML. Requests go straight to the service, never through the proxy pool.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::core::transport::HttpTransport;
use crate::core::types::FetchedPage;
use crate::strategies::AttemptError;

/// Default readiness predicate: the interstitial title is gone and the
/// product title has rendered.
pub const DEFAULT_WAIT_FUNCTION: &str = "() => !document.title.includes('Just a moment') \
    && !!document.querySelector('#productTitle')";

#[derive(Debug, Clone)]
pub struct RemoteRenderConfig {
    pub endpoint: String,
    pub token: String,
    /// JavaScript predicate polled inside the rendered page.
    pub wait_function: String,
    /// Polling cadence forwarded to the service, in milliseconds.
    pub polling_interval: Duration,
    /// In-page budget for the predicate.
    pub challenge_budget: Duration,
    /// Extra settle time after the predicate resolves.
    pub settle: Duration,
    /// Network timeout of the POST itself.
    pub request_timeout: Duration,
}

impl RemoteRenderConfig {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            wait_function: DEFAULT_WAIT_FUNCTION.to_string(),
            polling_interval: Duration::from_millis(1000),
            challenge_budget: Duration::from_secs(15),
            settle: Duration::from_millis(2000),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_wait_function(mut self, wait_function: impl Into<String>) -> Self {
        self.wait_function = wait_function.into();
        self
    }

    pub fn with_challenge_budget(mut self, budget: Duration) -> Self {
        self.challenge_budget = budget;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderRequest<'a> {
    url: &'a str,
    wait_for_function: WaitForFunction<'a>,
    wait_for_timeout: u64,
}

#[derive(Debug, Serialize)]
struct WaitForFunction<'a> {
    #[serde(rename = "fn")]
    function: &'a str,
    polling: u64,
    timeout: u64,
}

pub struct RenderServiceClient {
    config: RemoteRenderConfig,
    transport: Arc<dyn HttpTransport>,
}

impl RenderServiceClient {
    pub fn new(config: RemoteRenderConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &RemoteRenderConfig {
        &self.config
    }

    /// Service endpoint with the access token attached.
    pub fn request_url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&self.config.endpoint)?;
        url.query_pairs_mut().append_pair("token", &self.config.token);
        Ok(url)
    }

    pub fn payload(&self, target: &Url) -> serde_json::Value {
        let request = RenderRequest {
            url: target.as_str(),
            wait_for_function: WaitForFunction {
                function: &self.config.wait_function,
                polling: self.config.polling_interval.as_millis() as u64,
                timeout: self.config.challenge_budget.as_millis() as u64,
            },
            wait_for_timeout: self.config.settle.as_millis() as u64,
        };
        // Plain structs of strings and integers always serialize.
        serde_json::to_value(request).unwrap_or(serde_json::Value::Null)
    }

    /// Render `target` remotely. Non-200 answers fail as transport errors;
    /// block markers are left to the caller's classifier.
    pub async fn render(&self, target: &Url) -> Result<FetchedPage, AttemptError> {
        let endpoint = self
            .request_url()
            .map_err(|err| AttemptError::Transport(format!("invalid render endpoint: {}", err)))?;
        let response = self
            .transport
            .post_json(&endpoint, &self.payload(target), self.config.request_timeout)
            .await?;
        if response.status != 200 {
            return Err(AttemptError::Transport(format!(
                "render service answered {}",
                response.status
            )));
        }
        Ok(FetchedPage::new(response.body, target.clone()))
    }
}
