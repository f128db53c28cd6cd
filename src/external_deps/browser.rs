//! Chromium-backed [`PageRenderer`].
//!
//! One browser per render: the proxy and the identity are launch arguments,
//! so a session cannot be shared between attempts with different routes.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use log::debug;
use tokio::task::JoinHandle;
use url::Url;

use crate::core::types::FetchedPage;
use crate::modules::identity::BrowserFingerprint;
use crate::strategies::{AttemptError, PageRenderer};

#[derive(Debug, Clone)]
pub struct ChromiumConfig {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    /// Budget for launch, navigation, and content retrieval together.
    pub navigation_timeout: Duration,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

/// Browser plus its CDP event loop. Closes the browser when dropped so an
/// abandoned render never leaks a Chromium process.
struct BrowserSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
}

impl BrowserSession {
    async fn launch(config: BrowserConfig) -> Result<Self, AttemptError> {
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| AttemptError::Transport(format!("browser launch failed: {}", err)))?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Some(browser),
            handler: Some(handle),
        })
    }

    async fn load(&self, url: &Url) -> Result<FetchedPage, AttemptError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| AttemptError::Transport("browser already closed".into()))?;
        let page = browser.new_page(url.as_str()).await.map_err(cdp_error)?;
        page.wait_for_navigation().await.map_err(cdp_error)?;
        let html = page.content().await.map_err(cdp_error)?;
        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .and_then(|raw| Url::parse(&raw).ok())
            .unwrap_or_else(|| url.clone());
        Ok(FetchedPage::new(html, final_url))
    }

    async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(err) = browser.close().await {
                debug!("Browser close reported: {}", err);
            }
            if let Some(handler) = self.handler.take() {
                let _ = handler.await;
            }
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            let handler = self.handler.take();
            tokio::spawn(async move {
                let _ = browser.close().await;
                if let Some(handler) = handler {
                    let _ = handler.await;
                }
            });
        }
    }
}

fn cdp_error(err: chromiumoxide::error::CdpError) -> AttemptError {
    AttemptError::Transport(format!("browser: {}", err))
}

#[derive(Debug, Clone, Default)]
pub struct ChromiumRenderer {
    config: ChromiumConfig,
}

impl ChromiumRenderer {
    pub fn new(config: ChromiumConfig) -> Self {
        Self { config }
    }

    fn browser_config(
        &self,
        proxy: Option<&str>,
        fingerprint: &BrowserFingerprint,
    ) -> Result<BrowserConfig, AttemptError> {
        let (width, height) = fingerprint.screen_resolution;
        let language = fingerprint
            .language
            .split(',')
            .next()
            .unwrap_or("en-US");

        let mut builder = BrowserConfig::builder()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-extensions")
            .arg("--no-sandbox")
            .arg(format!("--user-agent={}", fingerprint.user_agent))
            .arg(format!("--lang={}", language))
            .window_size(u32::from(width), u32::from(height));

        if let Some(proxy) = proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.config.executable {
            builder = builder.chrome_executable(path);
        }

        builder
            .build()
            .map_err(|err| AttemptError::Transport(format!("browser config: {}", err)))
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(
        &self,
        url: &Url,
        proxy: Option<&str>,
        fingerprint: &BrowserFingerprint,
    ) -> Result<FetchedPage, AttemptError> {
        let config = self.browser_config(proxy, fingerprint)?;
        let budget = self.config.navigation_timeout;

        let mut session = BrowserSession::launch(config).await?;
        let result = match tokio::time::timeout(budget, session.load(url)).await {
            Ok(result) => result,
            Err(_) => Err(AttemptError::Timeout(budget)),
        };
        session.close().await;
        result
    }
}
