//! Acquisition strategies.
//!
//! Each strategy tries to obtain the raw page of one target. Strategies that
//! hit the target site directly share [`PacedRetry`]: pacing delay, proxy
//! selection, a fresh identity, block classification, pool feedback, and
//! backoff between attempts.

pub mod browser;
pub mod direct;
pub mod remote_render;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use parking_lot::Mutex;
use thiserror::Error;
use url::Url;

use crate::core::timing::retry_delay;
use crate::core::transport::TransportError;
use crate::core::types::{AttemptOutcome, FetchAttempt, FetchTarget, FetchedPage, RawContent};
use crate::detection::{BlockDetector, BlockMarker, MarkerSeverity};
use crate::modules::events::{AcquisitionEvent, CooldownEvent, EventDispatcher};
use crate::modules::identity::{Identity, IdentityProvider};
use crate::modules::pacing::RequestPacer;
use crate::modules::proxy::{ProxyEndpoint, ProxyHealthPool};

pub use browser::{LocalBrowser, PageRenderer};
pub use direct::DirectRequest;
pub use remote_render::RemoteRenderStrategy;

/// Why a single attempt failed. Handled inside the strategy that produced it.
#[derive(Debug, Clone, Error)]
pub enum AttemptError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("challenge detected: {0}")]
    ChallengeDetected(BlockMarker),
}

impl AttemptError {
    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            AttemptError::Transport(_) => AttemptOutcome::TransportError,
            AttemptError::Timeout(_) => AttemptOutcome::Timeout,
            AttemptError::Status(403 | 429 | 503) => AttemptOutcome::Blocked,
            AttemptError::Status(_) => AttemptOutcome::TransportError,
            AttemptError::ChallengeDetected(_) => AttemptOutcome::Blocked,
        }
    }
}

impl From<TransportError> for AttemptError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(after) => AttemptError::Timeout(after),
            other => AttemptError::Transport(other.to_string()),
        }
    }
}

/// One strategy ran out of attempts.
#[derive(Debug, Clone, Error)]
#[error("{strategy} failed after {attempts} attempt(s): {last_error}")]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub attempts: u32,
    pub last_error: AttemptError,
}

/// Shared services and the attempt log of one fetch.
pub struct StrategyContext<'a> {
    pub target: &'a FetchTarget,
    pub pool: &'a ProxyHealthPool,
    pub pacer: &'a dyn RequestPacer,
    pub identity: &'a dyn IdentityProvider,
    pub detector: &'a BlockDetector,
    pub events: &'a EventDispatcher,
    attempts: Mutex<Vec<FetchAttempt>>,
}

impl<'a> StrategyContext<'a> {
    pub fn new(
        target: &'a FetchTarget,
        pool: &'a ProxyHealthPool,
        pacer: &'a dyn RequestPacer,
        identity: &'a dyn IdentityProvider,
        detector: &'a BlockDetector,
        events: &'a EventDispatcher,
    ) -> Self {
        Self {
            target,
            pool,
            pacer,
            identity,
            detector,
            events,
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Turn a fetched page into content, or reject it when it carries a
    /// blocking marker.
    pub fn classify(
        &self,
        page: FetchedPage,
        strategy: &'static str,
    ) -> Result<RawContent, AttemptError> {
        let marker = self.detector.detect(&page.text());
        match marker {
            Some(marker) if marker.severity == MarkerSeverity::Blocking => {
                Err(AttemptError::ChallengeDetected(marker))
            }
            marker => Ok(RawContent::new(page.body, page.url, strategy)
                .with_challenge_detected(marker.is_some())),
        }
    }

    /// Append an attempt to the log and announce it.
    pub fn record(
        &self,
        strategy: &'static str,
        attempt: u32,
        endpoint: Option<&ProxyEndpoint>,
        outcome: AttemptOutcome,
        elapsed: Duration,
    ) {
        let entry = FetchAttempt {
            target: self.target.id.clone(),
            strategy,
            attempt,
            endpoint: endpoint.map(|ep| ep.address().to_string()),
            outcome,
            elapsed,
            timestamp: Utc::now(),
        };
        self.attempts.lock().push(entry.clone());
        self.events.dispatch(AcquisitionEvent::Attempt(entry));
    }

    /// Count a failure against `endpoint`, announcing a cooldown if one
    /// started.
    pub fn report_failure(&self, endpoint: &ProxyEndpoint) {
        if self.pool.report_failure(endpoint) {
            self.events.dispatch(AcquisitionEvent::Cooldown(CooldownEvent {
                endpoint: endpoint.address().to_string(),
                failures: endpoint.stats().failures,
                cooldown: self.pool.config().cooldown,
                timestamp: Utc::now(),
            }));
        }
    }

    pub fn attempts(&self) -> Vec<FetchAttempt> {
        self.attempts.lock().clone()
    }

    pub fn into_attempts(self) -> Vec<FetchAttempt> {
        self.attempts.into_inner()
    }
}

/// A way of obtaining the raw page of a target.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn acquire(&self, ctx: &StrategyContext<'_>) -> Result<RawContent, StrategyFailure>;
}

/// A single request against the target site, issued by [`PacedRetry`].
#[async_trait]
pub trait PacedAttempt: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(
        &self,
        url: &Url,
        proxy: Option<&str>,
        identity: &Identity,
    ) -> Result<FetchedPage, AttemptError>;
}

/// Bounded retry loop around a [`PacedAttempt`].
pub struct PacedRetry<A> {
    inner: A,
    max_attempts: u32,
}

impl<A: PacedAttempt> PacedRetry<A> {
    /// `max_attempts` is raised to at least one.
    pub fn new(inner: A, max_attempts: u32) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: PacedAttempt> FetchStrategy for PacedRetry<A> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn acquire(&self, ctx: &StrategyContext<'_>) -> Result<RawContent, StrategyFailure> {
        let strategy = self.name();
        let mut attempt = 0;

        loop {
            let delay = ctx.pacer.delay_for(&ctx.target.id);
            debug!(
                "{} attempt {}/{} for {} in {:.2}s",
                strategy,
                attempt + 1,
                self.max_attempts,
                ctx.target.id,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;

            let endpoint = match ctx.pool.acquire() {
                Ok(endpoint) => Some(endpoint),
                Err(err) => {
                    debug!("{}; {} goes out without a proxy", err, strategy);
                    None
                }
            };
            let identity = ctx.identity.identity();

            let started = Instant::now();
            let result = self
                .inner
                .attempt(
                    &ctx.target.url,
                    endpoint.as_deref().map(ProxyEndpoint::address),
                    &identity,
                )
                .await
                .and_then(|page| ctx.classify(page, strategy));
            let elapsed = started.elapsed();

            let outcome = match &result {
                Ok(_) => AttemptOutcome::Success,
                Err(err) => err.outcome(),
            };
            if let Some(endpoint) = endpoint.as_deref() {
                if outcome.is_success() {
                    ctx.pool.report_success(endpoint);
                } else {
                    ctx.report_failure(endpoint);
                }
            }
            ctx.record(strategy, attempt, endpoint.as_deref(), outcome, elapsed);

            let err = match result {
                Ok(content) => return Ok(content),
                Err(err) => err,
            };
            debug!("{} attempt {} for {} failed: {}", strategy, attempt + 1, ctx.target.id, err);

            match retry_delay(attempt, self.max_attempts) {
                Some(wait) => {
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                None => {
                    return Err(StrategyFailure {
                        strategy,
                        attempts: self.max_attempts,
                        last_error: err,
                    });
                }
            }
        }
    }
}
