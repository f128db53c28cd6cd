//! Fetcher configuration.
//!
//! Plain structs with defaults, overridable field by field, plus loading from
//! the process environment:
//! - `PROXY_LIST`: comma or newline separated proxy URIs
//! - `RENDER_SERVICE_URL` / `RENDER_SERVICE_TOKEN`: remote rendering service
//! - `TARGET_URL_TEMPLATE`: page URL with an `{id}` placeholder

use std::time::Duration;

use log::warn;
use thiserror::Error;
use url::Url;

use crate::external_deps::render::RemoteRenderConfig;
use crate::modules::pacing::PacingConfig;
use crate::modules::proxy::ProxyPoolConfig;

pub const DEFAULT_TARGET_TEMPLATE: &str = "https://www.amazon.in/dp/{id}";
pub const ID_PLACEHOLDER: &str = "{id}";

pub const ENV_PROXY_LIST: &str = "PROXY_LIST";
pub const ENV_RENDER_URL: &str = "RENDER_SERVICE_URL";
pub const ENV_RENDER_TOKEN: &str = "RENDER_SERVICE_TOKEN";
pub const ENV_TARGET_TEMPLATE: &str = "TARGET_URL_TEMPLATE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("target template `{0}` must contain `{{id}}` and form an absolute URL")]
    InvalidTemplate(String),
    #[error("{0} is set but {1} is missing")]
    Incomplete(&'static str, &'static str),
    #[error("invalid render service URL `{0}`: {1}")]
    InvalidRenderUrl(String, url::ParseError),
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub target_url_template: String,
    pub proxies: Vec<String>,
    pub proxy_pool: ProxyPoolConfig,
    pub pacing: PacingConfig,
    pub remote_render: Option<RemoteRenderConfig>,
    pub direct_attempts: u32,
    pub browser_attempts: u32,
    /// Timeout of one direct request.
    pub request_timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            target_url_template: DEFAULT_TARGET_TEMPLATE.to_string(),
            proxies: Vec::new(),
            proxy_pool: ProxyPoolConfig::default(),
            pacing: PacingConfig::default(),
            remote_render: None,
            direct_attempts: 3,
            browser_attempts: 1,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl FetcherConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(list) = get(ENV_PROXY_LIST) {
            config.proxies = parse_proxy_list(&list);
        }
        if let Some(template) = get(ENV_TARGET_TEMPLATE) {
            config.target_url_template = template.trim().to_string();
        }

        match (get(ENV_RENDER_URL), get(ENV_RENDER_TOKEN)) {
            (Some(endpoint), Some(token)) => {
                let endpoint = endpoint.trim().to_string();
                Url::parse(&endpoint)
                    .map_err(|err| ConfigError::InvalidRenderUrl(endpoint.clone(), err))?;
                config.remote_render = Some(RemoteRenderConfig::new(endpoint, token.trim()));
            }
            (Some(_), None) => return Err(ConfigError::Incomplete(ENV_RENDER_URL, ENV_RENDER_TOKEN)),
            (None, Some(_)) => return Err(ConfigError::Incomplete(ENV_RENDER_TOKEN, ENV_RENDER_URL)),
            (None, None) => {}
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.target_url_template.contains(ID_PLACEHOLDER)
            || Url::parse(&self.target_url_template.replace(ID_PLACEHOLDER, "sample")).is_err()
        {
            return Err(ConfigError::InvalidTemplate(self.target_url_template.clone()));
        }
        Ok(())
    }

    /// Concrete page URL of `id`.
    pub fn target_url(&self, id: &str) -> Result<Url, url::ParseError> {
        Url::parse(&self.target_url_template.replace(ID_PLACEHOLDER, id))
    }
}

/// Split a proxy list on commas and newlines. Blank entries and `#` comments
/// are skipped; bare `host:port` entries are taken as HTTP proxies. Entries
/// that are neither are dropped with a warning.
pub fn parse_proxy_list(content: &str) -> Vec<String> {
    let (proxies, rejected) = split_proxy_list(content);
    for entry in rejected {
        warn!("Ignoring proxy entry `{}`: expected scheme://host:port or host:port", entry);
    }
    proxies
}

/// Accepted proxy URIs and the non-blank entries that could not be read.
fn split_proxy_list(content: &str) -> (Vec<String>, Vec<&str>) {
    let mut proxies = Vec::new();
    let mut rejected = Vec::new();
    for entry in content.split([',', '\n']).map(str::trim) {
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        } else if entry.contains("://") {
            proxies.push(entry.to_string());
        } else if entry.contains(':') {
            proxies.push(format!("http://{}", entry));
        } else {
            rejected.push(entry);
        }
    }
    (proxies, rejected)
}
