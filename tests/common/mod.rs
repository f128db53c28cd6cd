//! In-memory transport and fixtures shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::HeaderMap;
use http::header::USER_AGENT;
use parking_lot::Mutex;
use relay_fetch::{
    Fetcher, FetcherBuilder, HttpTransport, ProxyPoolConfig, RequestPacer, TransportError,
    TransportResponse,
};
use url::Url;

pub const HEALTH_URL: &str = "https://health.test/";
pub const PROXY_A: &str = "http://10.0.0.1:3128";
pub const PROXY_B: &str = "http://10.0.0.2:3128";

pub const PRODUCT_HTML: &str = r#"<html><head><title>Amazon.in: Acme Kettle</title></head><body>
<span id="productTitle">Acme Kettle</span>
<span class="a-price-whole">999.</span>
<input type="hidden" name="ASIN" value="B0KETTLE01">
</body></html>"#;

pub const ROBOT_CHECK_HTML: &str = r#"<html><head><title>Robot Check</title></head><body>
<form action="/errors/validateCaptcha">Enter the characters you see below</form>
</body></html>"#;

#[derive(Debug, Clone)]
pub enum Reply {
    Page(u16, &'static str),
    Timeout,
    Refused,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub method: &'static str,
    pub url: Url,
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
}

/// Answers page GETs and render POSTs from scripted queues. Health probes
/// always succeed unless the proxy is listed as dead. An exhausted queue
/// refuses the connection.
#[derive(Default)]
pub struct ScriptedTransport {
    pages: Mutex<VecDeque<Reply>>,
    renders: Mutex<VecDeque<Reply>>,
    dead_proxies: Vec<String>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.pages.lock().extend(replies);
        self
    }

    pub fn with_renders(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.renders.lock().extend(replies);
        self
    }

    pub fn with_dead_proxy(mut self, proxy: &str) -> Self {
        self.dead_proxies.push(proxy.to_string());
        self
    }

    /// Calls other than health probes.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn answer(reply: Option<Reply>, url: &Url, timeout: Duration) -> Result<TransportResponse, TransportError> {
        match reply.unwrap_or(Reply::Refused) {
            Reply::Page(status, body) => Ok(TransportResponse::new(status, body, url.clone())),
            Reply::Timeout => Err(TransportError::Timeout(timeout)),
            Reply::Refused => Err(TransportError::Transport("connection refused".into())),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(
        &self,
        url: &Url,
        headers: &HeaderMap,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        if url.as_str() == HEALTH_URL {
            let dead = proxy.is_some_and(|p| self.dead_proxies.iter().any(|d| d == p));
            let status = if dead { 502 } else { 200 };
            return Ok(TransportResponse::new(status, "ok", url.clone()));
        }

        self.calls.lock().push(Call {
            method: "GET",
            url: url.clone(),
            proxy: proxy.map(str::to_string),
            user_agent: headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        });
        let reply = self.pages.lock().pop_front();
        Self::answer(reply, url, timeout)
    }

    async fn post_json(
        &self,
        url: &Url,
        _body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.lock().push(Call {
            method: "POST",
            url: url.clone(),
            proxy: None,
            user_agent: None,
        });
        let reply = self.renders.lock().pop_front();
        Self::answer(reply, url, timeout)
    }
}

/// Pacer that never waits, so elapsed time is backoff only.
pub struct NoPacing;

impl RequestPacer for NoPacing {
    fn delay_for(&self, _target: &str) -> Duration {
        Duration::ZERO
    }
}

/// Builder wired to `transport`, probing [`HEALTH_URL`], without pacing.
pub fn builder(transport: Arc<ScriptedTransport>, proxies: &[&str]) -> FetcherBuilder {
    let mut config = relay_fetch::FetcherConfig::default();
    config.proxy_pool = ProxyPoolConfig {
        health_check_url: HEALTH_URL.to_string(),
        ..ProxyPoolConfig::default()
    };
    Fetcher::builder()
        .with_config(config)
        .with_transport(transport)
        .with_pacer(Arc::new(NoPacing))
        .with_proxies(proxies.iter().copied())
        .disable_event_logging()
}
