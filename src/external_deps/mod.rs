//! Integrations that rely on services outside the process.
//!
//! The remote rendering service client, and (with the `browser` feature) a
//! Chromium renderer for the local-browser strategy.

#[cfg(feature = "browser")]
pub mod browser;
pub mod render;

#[cfg(feature = "browser")]
pub use browser::{ChromiumConfig, ChromiumRenderer};
pub use render::{RemoteRenderConfig, RenderServiceClient};
