mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use parking_lot::Mutex;
use relay_fetch::{
    AcquisitionEvent, AttemptError, AttemptOutcome, BrowserFingerprint, EventHandler, FetchError,
    FetchedPage, NOT_FOUND, PageRenderer, RemoteRenderConfig, RequestPacer,
};
use tokio::time::Instant;
use url::Url;

use common::{
    PRODUCT_HTML, PROXY_A, PROXY_B, ROBOT_CHECK_HTML, Reply, ScriptedTransport, builder,
};

#[tokio::test(start_paused = true)]
async fn blocked_render_and_timeouts_exhaust_every_strategy() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_renders([Reply::Page(200, ROBOT_CHECK_HTML)])
            .with_pages([Reply::Timeout, Reply::Timeout, Reply::Timeout]),
    );
    let fetcher = builder(transport.clone(), &[PROXY_A])
        .with_remote_render(RemoteRenderConfig::new("https://render.test/content", "tok"))
        .build()
        .unwrap();
    assert_eq!(fetcher.validate_proxies().await.healthy, 1);

    let started = Instant::now();
    let err = fetcher.fetch("B0KETTLE01").await.unwrap_err();
    // Backoff of 1s and 2s between the three direct attempts, none after.
    assert_eq!(started.elapsed(), Duration::from_secs(3));

    assert!(err.is_exhausted());
    assert_eq!(err.status_hint(), StatusCode::NOT_FOUND);
    let FetchError::AllStrategiesExhausted { failures, attempts, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(failures.len(), 2);
    assert!(matches!(failures[0].last_error, AttemptError::ChallengeDetected(_)));
    assert!(matches!(failures[1].last_error, AttemptError::Timeout(_)));

    let outcomes: Vec<_> = attempts.iter().map(|a| (a.strategy, a.outcome)).collect();
    assert_eq!(
        outcomes,
        vec![
            ("remote_render", AttemptOutcome::Blocked),
            ("direct", AttemptOutcome::Timeout),
            ("direct", AttemptOutcome::Timeout),
            ("direct", AttemptOutcome::Timeout),
        ]
    );
    assert!(attempts[0].endpoint.is_none());
    assert!(attempts[1..].iter().all(|a| a.endpoint.as_deref() == Some(PROXY_A)));

    let stats = fetcher.pool().endpoint(PROXY_A).unwrap().stats();
    assert_eq!(stats.failures, 3);
    assert!(stats.cooldown_until.is_some());
    assert_eq!(fetcher.pool().health_report().cooling_down, 1);

    let calls = transport.calls();
    assert_eq!(calls[0].method, "POST");
    assert_eq!(calls[0].url.query(), Some("token=tok"));
    assert!(calls[0].proxy.is_none());
}

#[tokio::test(start_paused = true)]
async fn second_attempt_succeeds_on_another_proxy() {
    let transport = Arc::new(ScriptedTransport::new().with_pages([
        Reply::Page(200, ROBOT_CHECK_HTML),
        Reply::Page(200, PRODUCT_HTML),
    ]));
    let fetcher = builder(transport.clone(), &[PROXY_A, PROXY_B]).build().unwrap();
    fetcher.validate_proxies().await;

    let started = Instant::now();
    let content = fetcher.fetch("B0KETTLE01").await.unwrap();
    assert_eq!(started.elapsed(), Duration::from_secs(1));
    assert_eq!(content.strategy, "direct");
    assert!(!content.challenge_detected);
    assert!(content.text().contains("Acme Kettle"));

    let a = fetcher.pool().endpoint(PROXY_A).unwrap().stats();
    let b = fetcher.pool().endpoint(PROXY_B).unwrap().stats();
    assert_eq!((a.successes, a.failures), (0, 1));
    assert_eq!((b.successes, b.failures), (1, 0));

    let proxies: Vec<_> = transport.calls().into_iter().map(|c| c.proxy).collect();
    assert_eq!(proxies, vec![Some(PROXY_A.to_string()), Some(PROXY_B.to_string())]);
}

#[tokio::test(start_paused = true)]
async fn goes_without_proxy_when_none_is_healthy() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_dead_proxy(PROXY_A)
            .with_pages([Reply::Page(503, "unavailable"), Reply::Page(200, PRODUCT_HTML)]),
    );
    let fetcher = builder(transport.clone(), &[PROXY_A]).build().unwrap();
    assert_eq!(fetcher.validate_proxies().await.healthy, 0);

    let content = fetcher.fetch("B0KETTLE01").await.unwrap();
    assert_eq!(content.strategy, "direct");
    assert!(transport.calls().iter().all(|c| c.proxy.is_none()));
    assert_eq!(fetcher.pool().endpoint(PROXY_A).unwrap().stats().failures, 0);
}

#[tokio::test(start_paused = true)]
async fn unvalidated_proxies_are_not_used() {
    let transport = Arc::new(ScriptedTransport::new().with_pages([Reply::Page(200, PRODUCT_HTML)]));
    let fetcher = builder(transport.clone(), &[PROXY_A]).build().unwrap();

    fetcher.fetch("B0KETTLE01").await.unwrap();
    assert_eq!(transport.calls()[0].proxy, None);
}

#[tokio::test(start_paused = true)]
async fn each_attempt_presents_an_identity() {
    let transport = Arc::new(ScriptedTransport::new().with_pages([
        Reply::Refused,
        Reply::Page(200, PRODUCT_HTML),
    ]));
    let fetcher = builder(transport.clone(), &[]).build().unwrap();

    fetcher.fetch("B0KETTLE01").await.unwrap();
    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.user_agent.as_deref().is_some_and(|ua| ua.starts_with("Mozilla/5.0"))));
    assert_eq!(calls[0].url.as_str(), "https://www.amazon.in/dp/B0KETTLE01");
}

#[tokio::test(start_paused = true)]
async fn suspicious_pages_are_accepted_and_flagged() {
    const WIDGET_PAGE: &str =
        r#"<span id="productTitle">Acme Kettle</span><div class="g-recaptcha"></div>"#;
    let transport = Arc::new(ScriptedTransport::new().with_pages([Reply::Page(200, WIDGET_PAGE)]));
    let fetcher = builder(transport, &[]).build().unwrap();

    let content = fetcher.fetch("B0KETTLE01").await.unwrap();
    assert!(content.challenge_detected);
}

#[tokio::test(start_paused = true)]
async fn render_success_short_circuits_direct_requests() {
    let transport = Arc::new(ScriptedTransport::new().with_renders([Reply::Page(200, PRODUCT_HTML)]));
    let fetcher = builder(transport.clone(), &[])
        .with_remote_render(RemoteRenderConfig::new("https://render.test/content", "tok"))
        .build()
        .unwrap();

    let started = Instant::now();
    let content = fetcher.fetch("B0KETTLE01").await.unwrap();
    assert_eq!(content.strategy, "remote_render");
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(transport.calls().iter().all(|c| c.method == "POST"));
}

#[tokio::test(start_paused = true)]
async fn invalid_identifiers_never_reach_the_network() {
    let transport = Arc::new(ScriptedTransport::new());
    let fetcher = builder(transport.clone(), &[]).build().unwrap();

    let err = fetcher.fetch("../../admin").await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidTarget(_)));
    assert_eq!(err.status_hint(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(transport.calls().is_empty());
}

struct FailingRenderer {
    renders: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl PageRenderer for FailingRenderer {
    async fn render(
        &self,
        _url: &Url,
        proxy: Option<&str>,
        fingerprint: &BrowserFingerprint,
    ) -> Result<FetchedPage, AttemptError> {
        assert!(!fingerprint.user_agent.is_empty());
        self.renders.lock().push(proxy.map(str::to_string));
        Err(AttemptError::Transport("browser crashed".into()))
    }
}

#[tokio::test(start_paused = true)]
async fn local_browser_falls_back_to_direct() {
    let renderer = Arc::new(FailingRenderer {
        renders: Mutex::new(Vec::new()),
    });
    let transport = Arc::new(ScriptedTransport::new().with_pages([Reply::Page(200, PRODUCT_HTML)]));
    let fetcher = builder(transport, &[PROXY_A])
        .with_page_renderer(renderer.clone())
        .build()
        .unwrap();
    fetcher.validate_proxies().await;
    assert_eq!(fetcher.strategy_names(), vec!["local_browser", "direct"]);

    let content = fetcher.fetch("B0KETTLE01").await.unwrap();
    assert_eq!(content.strategy, "direct");
    assert_eq!(*renderer.renders.lock(), vec![Some(PROXY_A.to_string())]);

    // The browser failure counted against the proxy, the direct success
    // forgave it.
    let stats = fetcher.pool().endpoint(PROXY_A).unwrap().stats();
    assert_eq!((stats.successes, stats.failures), (1, 0));
}

#[derive(Default)]
struct RecordingPacer(Mutex<Vec<String>>);

impl RequestPacer for RecordingPacer {
    fn delay_for(&self, target: &str) -> Duration {
        self.0.lock().push(target.to_string());
        Duration::ZERO
    }
}

#[tokio::test(start_paused = true)]
async fn every_paced_attempt_feeds_the_pacer() {
    let pacer = Arc::new(RecordingPacer::default());
    let renderer = Arc::new(FailingRenderer {
        renders: Mutex::new(Vec::new()),
    });
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_renders([Reply::Page(200, ROBOT_CHECK_HTML)])
            .with_pages([Reply::Refused, Reply::Page(503, "unavailable"), Reply::Page(200, PRODUCT_HTML)]),
    );
    let fetcher = builder(transport, &[])
        .with_pacer(pacer.clone())
        .with_remote_render(RemoteRenderConfig::new("https://render.test/content", "tok"))
        .with_page_renderer(renderer)
        .build()
        .unwrap();

    let content = fetcher.fetch("B0KETTLE01").await.unwrap();
    assert_eq!(content.strategy, "direct");

    // One browser attempt and three direct attempts; the render call is unpaced.
    assert_eq!(*pacer.0.lock(), vec!["B0KETTLE01"; 4]);
}

#[derive(Default)]
struct Recorder(Mutex<Vec<&'static str>>);

impl EventHandler for Recorder {
    fn handle(&self, event: &AcquisitionEvent) {
        let kind = match event {
            AcquisitionEvent::Attempt(_) => "attempt",
            AcquisitionEvent::StrategyExhausted(_) => "exhausted",
            AcquisitionEvent::Cooldown(_) => "cooldown",
            AcquisitionEvent::Validation(_) => "validation",
            AcquisitionEvent::Completed(_) => "completed",
        };
        self.0.lock().push(kind);
    }
}

#[tokio::test(start_paused = true)]
async fn events_trace_the_fetch() {
    let recorder = Arc::new(Recorder::default());
    let transport = Arc::new(ScriptedTransport::new().with_pages([
        Reply::Refused,
        Reply::Refused,
        Reply::Refused,
    ]));
    let fetcher = builder(transport, &[PROXY_A])
        .with_event_handler(recorder.clone())
        .build()
        .unwrap();
    fetcher.validate_proxies().await;

    fetcher.fetch("B0KETTLE01").await.unwrap_err();
    assert_eq!(
        *recorder.0.lock(),
        vec!["validation", "attempt", "attempt", "cooldown", "attempt", "exhausted"]
    );
}

#[tokio::test(start_paused = true)]
async fn fetch_product_extracts_the_record() {
    let transport = Arc::new(ScriptedTransport::new().with_pages([Reply::Page(200, PRODUCT_HTML)]));
    let fetcher = builder(transport, &[]).build().unwrap();

    let record = fetcher.fetch_product("B0KETTLE01").await.unwrap();
    assert_eq!(record.title, "Acme Kettle");
    assert_eq!(record.price, "999");
    assert_eq!(record.asin, "B0KETTLE01");
    assert_eq!(record.mrp, NOT_FOUND);
}
