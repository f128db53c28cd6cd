//! Plain HTTP GET against the target, through a proxy when one is available.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::{AttemptError, PacedAttempt};
use crate::core::transport::HttpTransport;
use crate::core::types::FetchedPage;
use crate::modules::identity::Identity;

pub struct DirectRequest {
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
}

impl DirectRequest {
    pub const NAME: &'static str = "direct";

    pub fn new(transport: Arc<dyn HttpTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl PacedAttempt for DirectRequest {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn attempt(
        &self,
        url: &Url,
        proxy: Option<&str>,
        identity: &Identity,
    ) -> Result<FetchedPage, AttemptError> {
        let response = self
            .transport
            .get(url, &identity.headers, proxy, self.timeout)
            .await?;
        if !response.is_success() {
            return Err(AttemptError::Status(response.status));
        }
        Ok(FetchedPage::new(response.body, response.url))
    }
}
