//! Fallback fetch orchestration.
//!
//! Resolves a target identifier, then walks the configured strategies in
//! priority order (remote rendering, local browser, direct request) until one
//! of them returns content. Proxy health, pacing, identity rotation and block
//! detection are shared by every strategy of one [`Fetcher`].

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use http::StatusCode;
use log::{debug, info};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, FetcherConfig};
use crate::core::reqwest_client::ReqwestTransport;
use crate::core::transport::HttpTransport;
use crate::core::types::{FetchAttempt, FetchTarget, RawContent};
use crate::detection::BlockDetector;
use crate::external_deps::render::{RemoteRenderConfig, RenderServiceClient};
use crate::extract::{ExtractionAdapter, ProductExtractor, ProductRecord};
use crate::modules::events::{
	AcquisitionEvent, CompletedEvent, EventDispatcher, EventHandler, LoggingHandler,
	StrategyExhaustedEvent, ValidationEvent,
};
use crate::modules::identity::{IdentityProvider, RotatingIdentityProvider};
use crate::modules::pacing::{AdaptivePacing, RequestPacer};
use crate::modules::proxy::{ProxyHealthPool, ValidationSummary};
use crate::strategies::{
	DirectRequest, FetchStrategy, LocalBrowser, PacedRetry, PageRenderer, RemoteRenderStrategy,
	StrategyContext, StrategyFailure,
};

/// Result alias used across the orchestration layer.
pub type FetchResult<T> = Result<T, FetchError>;

/// Error surfaced to callers of [`Fetcher`].
#[derive(Debug, Error)]
pub enum FetchError {
	#[error("invalid target identifier `{0}`")]
	InvalidTarget(String),
	#[error("all strategies exhausted for {target} after {} attempt(s)", .attempts.len())]
	AllStrategiesExhausted {
		target: String,
		failures: Vec<StrategyFailure>,
		attempts: Vec<FetchAttempt>,
	},
	#[error("http client error: {0}")]
	Http(#[from] reqwest::Error),
	#[error("url parse error: {0}")]
	Url(#[from] url::ParseError),
	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
}

impl FetchError {
	pub fn is_exhausted(&self) -> bool {
		matches!(self, FetchError::AllStrategiesExhausted { .. })
	}

	/// Status an outer HTTP boundary should answer with: exhaustion means the
	/// page is unavailable, anything else is an internal fault.
	pub fn status_hint(&self) -> StatusCode {
		if self.is_exhausted() {
			StatusCode::NOT_FOUND
		} else {
			StatusCode::INTERNAL_SERVER_ERROR
		}
	}

	/// Attempt log of an exhausted fetch.
	pub fn attempts(&self) -> &[FetchAttempt] {
		match self {
			FetchError::AllStrategiesExhausted { attempts, .. } => attempts,
			_ => &[],
		}
	}
}

/// Fluent builder for [`Fetcher`].
pub struct FetcherBuilder {
	config: FetcherConfig,
	transport: Option<Arc<dyn HttpTransport>>,
	pool: Option<Arc<ProxyHealthPool>>,
	pacer: Option<Arc<dyn RequestPacer>>,
	identity: Option<Arc<dyn IdentityProvider>>,
	renderer: Option<Arc<dyn PageRenderer>>,
	detector: BlockDetector,
	handlers: Vec<Arc<dyn EventHandler>>,
	log_events: bool,
}

impl FetcherBuilder {
	pub fn new() -> Self {
		Self {
			config: FetcherConfig::default(),
			transport: None,
			pool: None,
			pacer: None,
			identity: None,
			renderer: None,
			detector: BlockDetector::default(),
			handlers: Vec::new(),
			log_events: true,
		}
	}

	pub fn with_config(mut self, config: FetcherConfig) -> Self {
		self.config = config;
		self
	}

	pub fn with_proxies<I, S>(mut self, proxies: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.config.proxies = proxies.into_iter().map(Into::into).collect();
		self
	}

	pub fn with_target_template(mut self, template: impl Into<String>) -> Self {
		self.config.target_url_template = template.into();
		self
	}

	pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Share an existing pool; configured proxies are loaded into it.
	pub fn with_pool(mut self, pool: Arc<ProxyHealthPool>) -> Self {
		self.pool = Some(pool);
		self
	}

	pub fn with_pacer(mut self, pacer: Arc<dyn RequestPacer>) -> Self {
		self.pacer = Some(pacer);
		self
	}

	pub fn with_identity_provider(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
		self.identity = Some(identity);
		self
	}

	/// Enable the local-browser strategy.
	pub fn with_page_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
		self.renderer = Some(renderer);
		self
	}

	/// Enable the remote-rendering strategy.
	pub fn with_remote_render(mut self, config: RemoteRenderConfig) -> Self {
		self.config.remote_render = Some(config);
		self
	}

	pub fn with_detector(mut self, detector: BlockDetector) -> Self {
		self.detector = detector;
		self
	}

	pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	pub fn disable_event_logging(mut self) -> Self {
		self.log_events = false;
		self
	}

	pub fn with_direct_attempts(mut self, attempts: u32) -> Self {
		self.config.direct_attempts = attempts.max(1);
		self
	}

	pub fn with_browser_attempts(mut self, attempts: u32) -> Self {
		self.config.browser_attempts = attempts.max(1);
		self
	}

	pub fn build(self) -> FetchResult<Fetcher> {
		self.config.validate()?;
		let config = self.config;

		let transport: Arc<dyn HttpTransport> = match self.transport {
			Some(transport) => transport,
			None => Arc::new(ReqwestTransport::try_new()?),
		};
		let pool = self
			.pool
			.unwrap_or_else(|| Arc::new(ProxyHealthPool::new(config.proxy_pool.clone())));
		pool.load_endpoints(&config.proxies);
		let pacer = self
			.pacer
			.unwrap_or_else(|| Arc::new(AdaptivePacing::new(config.pacing.clone())));
		let identity = self
			.identity
			.unwrap_or_else(|| Arc::new(RotatingIdentityProvider::new()));

		let mut events = EventDispatcher::new();
		if self.log_events {
			events.register_handler(Arc::new(LoggingHandler));
		}
		for handler in self.handlers {
			events.register_handler(handler);
		}

		let mut strategies: Vec<Box<dyn FetchStrategy>> = Vec::new();
		if let Some(render) = config.remote_render.clone() {
			strategies.push(Box::new(RemoteRenderStrategy::new(RenderServiceClient::new(
				render,
				Arc::clone(&transport),
			))));
		}
		if let Some(renderer) = self.renderer {
			strategies.push(Box::new(PacedRetry::new(
				LocalBrowser::new(renderer),
				config.browser_attempts,
			)));
		}
		strategies.push(Box::new(PacedRetry::new(
			DirectRequest::new(Arc::clone(&transport), config.request_timeout),
			config.direct_attempts,
		)));

		Ok(Fetcher {
			config,
			transport,
			pool,
			pacer,
			identity,
			detector: self.detector,
			events,
			strategies,
		})
	}
}

impl Default for FetcherBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Acquires raw pages through a fallback chain of strategies.
pub struct Fetcher {
	config: FetcherConfig,
	transport: Arc<dyn HttpTransport>,
	pool: Arc<ProxyHealthPool>,
	pacer: Arc<dyn RequestPacer>,
	identity: Arc<dyn IdentityProvider>,
	detector: BlockDetector,
	events: EventDispatcher,
	strategies: Vec<Box<dyn FetchStrategy>>,
}

impl Fetcher {
	pub fn builder() -> FetcherBuilder {
		FetcherBuilder::new()
	}

	/// Fetcher configured from the process environment.
	pub fn from_env() -> FetchResult<Self> {
		FetcherBuilder::new()
			.with_config(FetcherConfig::from_env()?)
			.build()
	}

	pub fn config(&self) -> &FetcherConfig {
		&self.config
	}

	pub fn pool(&self) -> &Arc<ProxyHealthPool> {
		&self.pool
	}

	/// Strategy names in the order they are tried.
	pub fn strategy_names(&self) -> Vec<&'static str> {
		self.strategies.iter().map(|s| s.name()).collect()
	}

	/// Probe every configured proxy and announce the verdict.
	pub async fn validate_proxies(&self) -> ValidationSummary {
		let summary = self.pool.validate_all(self.transport.as_ref()).await;
		self.events
			.dispatch(AcquisitionEvent::Validation(ValidationEvent {
				total: summary.total,
				healthy: summary.healthy,
				timestamp: Utc::now(),
			}));
		summary
	}

	/// Periodic revalidation, when the pool config asks for it.
	pub fn spawn_revalidation(&self) -> Option<JoinHandle<()>> {
		Arc::clone(&self.pool).spawn_revalidation(Arc::clone(&self.transport))
	}

	/// Map an identifier to its page. Identifiers are non-empty runs of ASCII
	/// letters, digits, `-` and `_`.
	pub fn resolve(&self, id: &str) -> FetchResult<FetchTarget> {
		let id = id.trim();
		let well_formed = !id.is_empty()
			&& id
				.chars()
				.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
		if !well_formed {
			return Err(FetchError::InvalidTarget(id.to_string()));
		}
		let url = self.config.target_url(id)?;
		Ok(FetchTarget::new(id, url))
	}

	/// Acquire the raw page of `id`, trying each strategy in turn.
	pub async fn fetch(&self, id: &str) -> FetchResult<RawContent> {
		let target = self.resolve(id)?;
		let evicted = self.pacer.evict_idle();
		if evicted > 0 {
			debug!("Evicted pacing state of {} idle target(s)", evicted);
		}

		let ctx = StrategyContext::new(
			&target,
			&self.pool,
			self.pacer.as_ref(),
			self.identity.as_ref(),
			&self.detector,
			&self.events,
		);
		let started = Instant::now();
		let mut failures = Vec::new();

		for strategy in &self.strategies {
			match strategy.acquire(&ctx).await {
				Ok(content) => {
					self.events
						.dispatch(AcquisitionEvent::Completed(CompletedEvent {
							target: target.id.clone(),
							strategy: content.strategy,
							latency: started.elapsed(),
							challenge_detected: content.challenge_detected,
							timestamp: Utc::now(),
						}));
					return Ok(content);
				}
				Err(failure) => {
					self.events.dispatch(AcquisitionEvent::StrategyExhausted(
						StrategyExhaustedEvent {
							target: target.id.clone(),
							strategy: failure.strategy,
							attempts: failure.attempts,
							reason: failure.last_error.to_string(),
							timestamp: Utc::now(),
						},
					));
					failures.push(failure);
				}
			}
		}

		let attempts = ctx.into_attempts();
		info!(
			"Giving up on {} after {} strategies and {} attempts",
			target.id,
			failures.len(),
			attempts.len()
		);
		Err(FetchError::AllStrategiesExhausted {
			target: target.id,
			failures,
			attempts,
		})
	}

	/// Fetch `id` and run the page through `adapter`.
	pub async fn fetch_with<A>(&self, id: &str, adapter: &A) -> FetchResult<A::Output>
	where
		A: ExtractionAdapter + Sync,
	{
		let content = self.fetch(id).await?;
		Ok(adapter.extract(&content))
	}

	/// Fetch `id` and extract it as a product page.
	pub async fn fetch_product(&self, id: &str) -> FetchResult<ProductRecord> {
		self.fetch_with(id, &ProductExtractor::new()).await
	}
}
