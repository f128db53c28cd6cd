//! Proxy health pool.
//!
//! Tracks per-endpoint success/failure counters, validates endpoints against
//! a health-check target, benches repeat offenders for a cooldown window, and
//! selects the healthiest eligible endpoint for the next request.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future;
use http::HeaderMap;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::task::JoinHandle;
use url::Url;

use crate::core::transport::HttpTransport;

#[derive(Debug, Clone)]
pub struct ProxyPoolConfig {
    /// Page probed by [`ProxyHealthPool::validate_all`].
    pub health_check_url: String,
    pub health_check_timeout: Duration,
    /// Failure count at which an endpoint is benched.
    pub failure_threshold: u64,
    pub cooldown: Duration,
    /// Period of the optional background revalidation task.
    pub revalidate_interval: Option<Duration>,
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        Self {
            health_check_url: "https://www.amazon.in".to_string(),
            health_check_timeout: Duration::from_secs(10),
            failure_threshold: 3,
            cooldown: Duration::from_secs(30 * 60),
            revalidate_interval: None,
        }
    }
}

/// Returned by [`ProxyHealthPool::acquire`] when nothing is eligible.
#[derive(Debug, Error)]
#[error("no proxy endpoint available")]
pub struct NoEndpointAvailable;

/// Counters and availability window of one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointStats {
    pub successes: u64,
    pub failures: u64,
    pub last_used: Option<Instant>,
    pub cooldown_until: Option<Instant>,
    pub validated: bool,
}

impl EndpointStats {
    fn is_cooling_down(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }

    fn is_eligible(&self, now: Instant) -> bool {
        self.validated && !self.is_cooling_down(now)
    }

    /// Laplace-smoothed success rate; untried endpoints score 1.0.
    pub fn score(&self) -> f64 {
        if self.successes + self.failures == 0 {
            return 1.0;
        }
        self.successes as f64 / (self.successes + self.failures + 1) as f64
    }
}

/// A proxy address plus its own synchronized counters.
#[derive(Debug)]
pub struct ProxyEndpoint {
    address: String,
    stats: Mutex<EndpointStats>,
}

impl ProxyEndpoint {
    fn new(address: String) -> Self {
        Self {
            address,
            stats: Mutex::new(EndpointStats::default()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn stats(&self) -> EndpointStats {
        self.stats.lock().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationSummary {
    pub total: usize,
    pub healthy: usize,
}

#[derive(Debug, Clone)]
pub struct ProxyHealthReport {
    pub total_proxies: usize,
    pub validated_proxies: usize,
    pub available_proxies: usize,
    pub cooling_down: usize,
    pub details: HashMap<String, EndpointStats>,
}

/// Pool of proxy endpoints with health-based selection.
#[derive(Debug)]
pub struct ProxyHealthPool {
    config: ProxyPoolConfig,
    endpoints: RwLock<Vec<Arc<ProxyEndpoint>>>,
    /// Serializes the scan and the `last_used` stamp of [`select_at`](Self::select_at).
    selection: Mutex<()>,
}

impl ProxyHealthPool {
    pub fn new(config: ProxyPoolConfig) -> Self {
        Self {
            config,
            endpoints: RwLock::new(Vec::new()),
            selection: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ProxyPoolConfig {
        &self.config
    }

    /// Register one endpoint per non-empty address. Addresses already known
    /// are skipped, so loading the same list twice is harmless. Returns the
    /// number of endpoints added.
    pub fn load_endpoints<I>(&self, addresses: I) -> usize
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut endpoints = self.endpoints.write();
        let mut added = 0;
        for address in addresses {
            let address = address.as_ref().trim();
            if address.is_empty() || endpoints.iter().any(|ep| ep.address == address) {
                continue;
            }
            endpoints.push(Arc::new(ProxyEndpoint::new(address.to_string())));
            added += 1;
        }
        if added > 0 {
            info!("Loaded {} proxy endpoints ({} total)", added, endpoints.len());
        }
        added
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    pub fn endpoints(&self) -> Vec<Arc<ProxyEndpoint>> {
        self.endpoints.read().clone()
    }

    pub fn endpoint(&self, address: &str) -> Option<Arc<ProxyEndpoint>> {
        self.endpoints
            .read()
            .iter()
            .find(|ep| ep.address == address)
            .cloned()
    }

    /// Probe every endpoint concurrently and rebuild the validated subset.
    ///
    /// Each probe is bounded by `health_check_timeout`; one unreachable
    /// endpoint never delays or affects the verdict of another.
    pub async fn validate_all(&self, transport: &dyn HttpTransport) -> ValidationSummary {
        let endpoints = self.endpoints();
        let total = endpoints.len();

        let check_url = match Url::parse(&self.config.health_check_url) {
            Ok(url) => url,
            Err(err) => {
                warn!(
                    "Health check URL {} is invalid ({}); skipping validation",
                    self.config.health_check_url, err
                );
                return ValidationSummary { total, healthy: 0 };
            }
        };

        info!("Starting health check for {} proxies", total);
        let timeout = self.config.health_check_timeout;
        let headers = HeaderMap::new();

        let probes = endpoints.iter().map(|endpoint| {
            let check_url = &check_url;
            let headers = &headers;
            async move {
                let probe = transport.get(check_url, headers, Some(endpoint.address()), timeout);
                let healthy = match tokio::time::timeout(timeout, probe).await {
                    Ok(Ok(response)) => response.is_success(),
                    Ok(Err(err)) => {
                        debug!("Proxy {} failed health check: {}", endpoint.address(), err);
                        false
                    }
                    Err(_) => {
                        debug!("Proxy {} health check timed out", endpoint.address());
                        false
                    }
                };
                (endpoint, healthy)
            }
        });

        let results = future::join_all(probes).await;

        let mut healthy = 0;
        for (endpoint, is_healthy) in results {
            let mut stats = endpoint.stats.lock();
            if stats.validated != is_healthy {
                debug!(
                    "Proxy {} validation changed: {} -> {}",
                    endpoint.address, stats.validated, is_healthy
                );
            }
            stats.validated = is_healthy;
            if is_healthy {
                healthy += 1;
            }
        }

        info!("Health check completed: {}/{} proxies healthy", healthy, total);
        ValidationSummary { total, healthy }
    }

    /// Re-run [`validate_all`](Self::validate_all) every
    /// `revalidate_interval`. Returns `None` when no interval is configured.
    pub fn spawn_revalidation(
        self: Arc<Self>,
        transport: Arc<dyn HttpTransport>,
    ) -> Option<JoinHandle<()>> {
        let interval = self.config.revalidate_interval?;
        Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                self.validate_all(transport.as_ref()).await;
            }
        }))
    }

    /// Select the best eligible endpoint, or `None` when the caller must go
    /// without a proxy.
    pub fn select(&self) -> Option<Arc<ProxyEndpoint>> {
        self.select_at(Instant::now())
    }

    /// [`select`](Self::select) evaluated at an explicit instant.
    pub fn select_at(&self, now: Instant) -> Option<Arc<ProxyEndpoint>> {
        let _selecting = self.selection.lock();
        let endpoints = self.endpoints.read();

        let selected = endpoints
            .iter()
            .filter_map(|endpoint| {
                let stats = endpoint.stats.lock();
                stats
                    .is_eligible(now)
                    .then(|| (endpoint, stats.score(), stats.last_used))
            })
            // `min_by` keeps the first of equal candidates, so load order
            // breaks the remaining ties.
            .min_by(|(_, lhs_score, lhs_used), (_, rhs_score, rhs_used)| {
                rhs_score
                    .partial_cmp(lhs_score)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| lhs_used.cmp(rhs_used))
            })
            .map(|(endpoint, _, _)| Arc::clone(endpoint))?;

        selected.stats.lock().last_used = Some(now);
        Some(selected)
    }

    pub fn acquire(&self) -> Result<Arc<ProxyEndpoint>, NoEndpointAvailable> {
        self.select().ok_or(NoEndpointAvailable)
    }

    /// Count a success; each success forgives one past failure.
    pub fn report_success(&self, endpoint: &ProxyEndpoint) {
        let mut stats = endpoint.stats.lock();
        stats.successes += 1;
        stats.failures = stats.failures.saturating_sub(1);
    }

    /// Count a failure. Returns `true` when this failure benched the
    /// endpoint.
    pub fn report_failure(&self, endpoint: &ProxyEndpoint) -> bool {
        self.report_failure_at(endpoint, Instant::now())
    }

    pub fn report_failure_at(&self, endpoint: &ProxyEndpoint, now: Instant) -> bool {
        let mut stats = endpoint.stats.lock();
        stats.failures += 1;
        if stats.failures < self.config.failure_threshold {
            return false;
        }

        stats.cooldown_until = Some(now + self.config.cooldown);
        warn!(
            "Proxy {} cooling down for {}s after {} failures ({} successes)",
            endpoint.address,
            self.config.cooldown.as_secs(),
            stats.failures,
            stats.successes
        );
        true
    }

    pub fn health_report(&self) -> ProxyHealthReport {
        self.health_report_at(Instant::now())
    }

    pub fn health_report_at(&self, now: Instant) -> ProxyHealthReport {
        let endpoints = self.endpoints.read();
        let mut report = ProxyHealthReport {
            total_proxies: endpoints.len(),
            validated_proxies: 0,
            available_proxies: 0,
            cooling_down: 0,
            details: HashMap::with_capacity(endpoints.len()),
        };

        for endpoint in endpoints.iter() {
            let stats = endpoint.stats();
            if stats.validated {
                report.validated_proxies += 1;
            }
            if stats.is_cooling_down(now) {
                report.cooling_down += 1;
            } else if stats.validated {
                report.available_proxies += 1;
            }
            report.details.insert(endpoint.address.clone(), stats);
        }

        report
    }

    #[cfg(test)]
    pub(crate) fn mark_validated(&self) {
        for endpoint in self.endpoints.read().iter() {
            endpoint.stats.lock().validated = true;
        }
    }
}

impl Default for ProxyHealthPool {
    fn default() -> Self {
        Self::new(ProxyPoolConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::{TransportError, TransportResponse};
    use async_trait::async_trait;

    const A: &str = "http://1.1.1.1:8080";
    const B: &str = "http://2.2.2.2:8080";

    fn pool(addresses: &[&str]) -> ProxyHealthPool {
        let pool = ProxyHealthPool::default();
        pool.load_endpoints(addresses.iter().copied());
        pool.mark_validated();
        pool
    }

    #[test]
    fn loading_skips_blanks_and_duplicates() {
        let pool = ProxyHealthPool::default();
        assert_eq!(pool.load_endpoints([A, " ", "", B, A]), 2);
        assert_eq!(pool.load_endpoints([A, B]), 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn unvalidated_endpoints_are_never_selected() {
        let pool = ProxyHealthPool::default();
        pool.load_endpoints([A]);
        assert!(pool.select().is_none());
        assert!(pool.acquire().is_err());
    }

    #[test]
    fn fresh_endpoints_rotate_before_repeating() {
        let pool = pool(&[A, B]);
        let first = pool.select().unwrap();
        let second = pool.select().unwrap();
        assert_ne!(first.address(), second.address());
        assert_eq!(first.address(), A);
    }

    #[test]
    fn concurrent_selections_take_distinct_fresh_endpoints() {
        let addresses: Vec<String> = (1..=8).map(|n| format!("http://10.0.0.{}:3128", n)).collect();
        let pool = ProxyHealthPool::default();
        pool.load_endpoints(&addresses);
        pool.mark_validated();
        let now = Instant::now();

        let mut picked: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..addresses.len())
                .map(|_| scope.spawn(|| pool.select_at(now).unwrap().address().to_string()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        picked.sort();
        picked.dedup();
        assert_eq!(picked.len(), addresses.len());
    }

    #[test]
    fn least_recently_used_breaks_score_ties() {
        let pool = pool(&[A, B]);
        let start = Instant::now();
        assert_eq!(pool.select_at(start).unwrap().address(), A);
        assert_eq!(pool.select_at(start + Duration::from_secs(1)).unwrap().address(), B);
        assert_eq!(pool.select_at(start + Duration::from_secs(2)).unwrap().address(), A);
    }

    #[test]
    fn prefers_higher_success_rate() {
        let pool = pool(&[A, B]);
        let a = pool.endpoint(A).unwrap();
        let b = pool.endpoint(B).unwrap();
        pool.report_success(&a);
        pool.report_success(&a);
        pool.report_success(&b);
        pool.report_failure(&b);
        // A scores 2/3; B ends on 1 success and 1 failure, scoring 1/3.
        assert_eq!(pool.select().unwrap().address(), A);
    }

    #[test]
    fn success_forgives_exactly_one_failure() {
        let pool = pool(&[A]);
        let a = pool.endpoint(A).unwrap();
        pool.report_success(&a);
        assert_eq!(a.stats().failures, 0);

        pool.report_failure(&a);
        pool.report_failure(&a);
        pool.report_success(&a);
        let stats = a.stats();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.successes, 2);
    }

    #[test]
    fn three_failures_bench_the_endpoint() {
        let pool = pool(&[A]);
        let a = pool.endpoint(A).unwrap();
        let now = Instant::now();
        assert!(!pool.report_failure_at(&a, now));
        assert!(!pool.report_failure_at(&a, now));
        assert!(pool.report_failure_at(&a, now));

        assert!(pool.select_at(now).is_none());
        assert!(pool.select_at(now + Duration::from_secs(29 * 60)).is_none());
        assert!(pool.select_at(now + Duration::from_secs(30 * 60 + 1)).is_some());

        let report = pool.health_report_at(now);
        assert_eq!(report.cooling_down, 1);
        assert_eq!(report.available_proxies, 0);
    }

    #[test]
    fn repeat_offender_is_benched_on_next_failure() {
        let pool = pool(&[A]);
        let a = pool.endpoint(A).unwrap();
        let now = Instant::now();
        for _ in 0..3 {
            pool.report_failure_at(&a, now);
        }
        let later = now + Duration::from_secs(31 * 60);
        assert!(pool.select_at(later).is_some());
        assert!(pool.report_failure_at(&a, later));
        assert!(pool.select_at(later).is_none());
    }

    #[test]
    fn selection_never_returns_cooling_endpoints() {
        let pool = pool(&[A, B]);
        let now = Instant::now();
        let a = pool.endpoint(A).unwrap();
        for _ in 0..3 {
            pool.report_failure_at(&a, now);
        }
        for step in 0..10 {
            let selected = pool.select_at(now + Duration::from_secs(step)).unwrap();
            assert_eq!(selected.address(), B);
        }
    }

    struct ProbeTransport;

    #[async_trait]
    impl HttpTransport for ProbeTransport {
        async fn get(
            &self,
            url: &Url,
            _headers: &HeaderMap,
            proxy: Option<&str>,
            timeout: Duration,
        ) -> Result<TransportResponse, TransportError> {
            match proxy {
                Some(A) => Ok(TransportResponse::new(200, "ok", url.clone())),
                Some(B) => Ok(TransportResponse::new(503, "", url.clone())),
                _ => Err(TransportError::Timeout(timeout)),
            }
        }

        async fn post_json(
            &self,
            _url: &Url,
            _body: &serde_json::Value,
            _timeout: Duration,
        ) -> Result<TransportResponse, TransportError> {
            Err(TransportError::Transport("unsupported".into()))
        }
    }

    #[tokio::test]
    async fn validation_keeps_only_successful_probes() {
        let pool = ProxyHealthPool::default();
        pool.load_endpoints([A, B, "http://3.3.3.3:8080"]);
        let summary = pool.validate_all(&ProbeTransport).await;
        assert_eq!(summary, ValidationSummary { total: 3, healthy: 1 });
        assert!(pool.endpoint(A).unwrap().stats().validated);
        assert!(!pool.endpoint(B).unwrap().stats().validated);
        assert_eq!(pool.select().unwrap().address(), A);
    }
}
