//! Navigation through a locally driven browser.
//!
//! The browser itself sits behind [`PageRenderer`] so the strategy stays
//! independent of the automation backend. With the `browser` feature the
//! crate ships a Chromium renderer.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::{AttemptError, PacedAttempt};
use crate::core::types::FetchedPage;
use crate::modules::identity::{BrowserFingerprint, Identity};

/// Backend able to load a page in a real browser and return its final DOM.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(
        &self,
        url: &Url,
        proxy: Option<&str>,
        fingerprint: &BrowserFingerprint,
    ) -> Result<FetchedPage, AttemptError>;
}

pub struct LocalBrowser {
    renderer: Arc<dyn PageRenderer>,
}

impl LocalBrowser {
    pub const NAME: &'static str = "local_browser";

    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl PacedAttempt for LocalBrowser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn attempt(
        &self,
        url: &Url,
        proxy: Option<&str>,
        identity: &Identity,
    ) -> Result<FetchedPage, AttemptError> {
        self.renderer.render(url, proxy, &identity.fingerprint).await
    }
}
