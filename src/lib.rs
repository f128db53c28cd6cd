//! # relay-fetch
//!
//! Resilient acquisition of product pages from sites that rate-limit and
//! fingerprint automated clients.
//!
//! A [`Fetcher`] resolves a product identifier to its page and walks a
//! fallback chain of strategies until one returns content:
//!
//! - Remote rendering through a headless-browser service (when configured)
//! - A locally driven browser (when a [`PageRenderer`] is supplied)
//! - Direct HTTP requests through a health-scored proxy pool
//!
//! Requests hitting the target site are paced adaptively per target, carry a
//! freshly rotated browser identity, and are checked for block markers before
//! their content is accepted.
//!
//! ## Example
//!
//! ```no_run
//! use relay_fetch::Fetcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = Fetcher::from_env()?;
//!     fetcher.validate_proxies().await;
//!     let product = fetcher.fetch_product("B0EXAMPLE1").await?;
//!     println!("{}", serde_json::to_string_pretty(&product)?);
//!     Ok(())
//! }
//! ```

mod fetcher;

pub mod config;
pub mod core;
pub mod detection;
pub mod external_deps;
pub mod extract;
pub mod modules;
pub mod strategies;

pub use crate::fetcher::{FetchError, FetchResult, Fetcher, FetcherBuilder};

pub use crate::config::{ConfigError, FetcherConfig, parse_proxy_list};

pub use crate::core::{
    AttemptOutcome, FetchAttempt, FetchTarget, FetchedPage, HttpTransport, RawContent,
    ReqwestTransport, TransportError, TransportResponse, backoff_delay,
};

pub use crate::detection::{BlockDetector, BlockMarker, MarkerSeverity};

#[cfg(feature = "browser")]
pub use crate::external_deps::{ChromiumConfig, ChromiumRenderer};
pub use crate::external_deps::{RemoteRenderConfig, RenderServiceClient};

pub use crate::extract::{ExtractionAdapter, NOT_FOUND, ProductExtractor, ProductRecord};

pub use crate::modules::{
    AcquisitionEvent, AdaptivePacing, BrowserFingerprint, BrowserType, EventDispatcher,
    EventHandler, Identity, IdentityProvider, LoggingHandler, NoEndpointAvailable, PacingConfig,
    PacingMode, ProxyEndpoint, ProxyHealthPool, ProxyHealthReport, ProxyPoolConfig, RequestPacer,
    RotatingIdentityProvider, StaticIdentityProvider, ValidationSummary,
};

pub use crate::strategies::{
    AttemptError, FetchStrategy, PageRenderer, StrategyContext, StrategyFailure,
};

/// Crate version as declared in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
