//! Core utilities shared by the pool, the strategies, and the orchestrator.

pub mod reqwest_client;
pub mod timing;
pub mod transport;
pub mod types;

pub use reqwest_client::ReqwestTransport;
pub use timing::{backoff_delay, retry_delay};
pub use transport::{HttpTransport, TransportError, TransportResponse};
pub use types::{AttemptOutcome, FetchAttempt, FetchTarget, FetchedPage, RawContent};
