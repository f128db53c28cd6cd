//! Fetch through the remote rendering service.
//!
//! One attempt per fetch, without pacing or a proxy; the service does its own
//! browsing.

use std::time::Instant;

use async_trait::async_trait;

use super::{FetchStrategy, StrategyContext, StrategyFailure};
use crate::core::types::{AttemptOutcome, RawContent};
use crate::external_deps::render::RenderServiceClient;

pub struct RemoteRenderStrategy {
    client: RenderServiceClient,
}

impl RemoteRenderStrategy {
    pub const NAME: &'static str = "remote_render";

    pub fn new(client: RenderServiceClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RenderServiceClient {
        &self.client
    }
}

#[async_trait]
impl FetchStrategy for RemoteRenderStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn acquire(&self, ctx: &StrategyContext<'_>) -> Result<RawContent, StrategyFailure> {
        let started = Instant::now();
        let result = self
            .client
            .render(&ctx.target.url)
            .await
            .and_then(|page| ctx.classify(page, Self::NAME));

        let outcome = match &result {
            Ok(_) => AttemptOutcome::Success,
            Err(err) => err.outcome(),
        };
        ctx.record(Self::NAME, 0, None, outcome, started.elapsed());

        result.map_err(|last_error| StrategyFailure {
            strategy: Self::NAME,
            attempts: 1,
            last_error,
        })
    }
}
