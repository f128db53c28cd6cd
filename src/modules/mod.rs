//! Shared services consulted by the acquisition strategies.
//!
//! Proxy health, request pacing, identity rotation, and event dispatch.

pub mod events;
pub mod identity;
pub mod pacing;
pub mod proxy;

pub use events::{
    AcquisitionEvent, CompletedEvent, CooldownEvent, EventDispatcher, EventHandler,
    LoggingHandler, StrategyExhaustedEvent, ValidationEvent,
};
pub use identity::{
    BrowserFingerprint, BrowserType, Identity, IdentityProvider, RotatingIdentityProvider,
    StaticIdentityProvider,
};
pub use pacing::{AdaptivePacing, PacingConfig, PacingMode, PacingSnapshot, RequestPacer};
pub use proxy::{
    EndpointStats, NoEndpointAvailable, ProxyEndpoint, ProxyHealthPool, ProxyHealthReport,
    ProxyPoolConfig, ValidationSummary,
};
