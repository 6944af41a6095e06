use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use xspect::cancel::CancelToken;
use xspect::model::{
    FailureReason, Scan, ScanOptions, ScanRequest, ScanStatus, ScanType, Severity,
};
use xspect::orchestrator::{Engine, EngineConfig};
use xspect::store::{MemoryScanStore, ScanStore};
use xspect::triage::RuleBasedSummarizer;

const FORM_PAGE: &str =
    r#"<html><body><form action="/search" method="get"><input type="text" name="q"></form></body></html>"#;

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Echoes the `q` parameter into the page body. When `reflect_verbatim` is
/// set, one specific payload comes back unencoded, the way a vulnerable
/// search page would render it.
struct SearchPage {
    reflect_verbatim: Option<&'static str>,
}

impl Respond for SearchPage {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let q = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "q")
            .map(|(_, v)| v.to_string())
            .unwrap_or_default();
        let rendered = match self.reflect_verbatim {
            Some(value) if q == value => q,
            _ => html_escape(&q),
        };
        ResponseTemplate::new(200).set_body_string(format!(
            "<html><body>Results for {}</body></html>",
            rendered
        ))
    }
}

/// Echoes like [`SearchPage`], but trips the cancellation token the moment
/// the marker payload is served, as if an operator hit ctrl-c mid-probe.
struct CancellingSearch {
    reflect: &'static str,
    token: CancelToken,
}

impl Respond for CancellingSearch {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let q = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "q")
            .map(|(_, v)| v.to_string())
            .unwrap_or_default();
        let rendered = if q == self.reflect {
            self.token.cancel();
            q
        } else {
            html_escape(&q)
        };
        ResponseTemplate::new(200).set_body_string(format!(
            "<html><body>Results for {}</body></html>",
            rendered
        ))
    }
}

/// Delegates to a real store but rejects a configurable range of save
/// calls, to exercise mid-scan snapshot failures.
struct FlakyStore {
    inner: MemoryScanStore,
    saves: AtomicUsize,
    fail_from: usize,
    fail_to: usize,
}

impl FlakyStore {
    fn failing_saves(fail_from: usize, fail_to: usize) -> Self {
        Self {
            inner: MemoryScanStore::new(),
            saves: AtomicUsize::new(0),
            fail_from,
            fail_to,
        }
    }
}

#[async_trait]
impl ScanStore for FlakyStore {
    async fn save(&self, scan: &Scan) -> Result<()> {
        let call = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        if (self.fail_from..=self.fail_to).contains(&call) {
            anyhow::bail!("store offline");
        }
        self.inner.save(scan).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Scan>> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Scan>> {
        self.inner.list().await
    }
}

fn quick_request(server: &MockServer) -> ScanRequest {
    ScanRequest {
        target_url: Url::parse(&server.uri()).unwrap(),
        scan_type: ScanType::Quick,
        options: ScanOptions {
            include_forms: true,
            include_urls: true,
            max_depth: 0,
        },
        custom_payloads: Vec::new(),
    }
}

fn engine(store: Arc<MemoryScanStore>) -> Engine {
    let config = EngineConfig {
        timeout: Duration::from_secs(5),
        ..EngineConfig::default()
    };
    Engine::new(config, store)
}

async fn search_site(reflect_verbatim: Option<&'static str>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FORM_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(SearchPage { reflect_verbatim })
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn verbatim_reflection_yields_one_html_body_finding() {
    let server = search_site(Some("<script>alert('XSS')</script>")).await;
    let store = Arc::new(MemoryScanStore::new());
    let scan = engine(store.clone())
        .run(quick_request(&server), CancelToken::new())
        .await
        .unwrap();

    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.vulnerabilities.len(), 1);
    let vuln = &scan.vulnerabilities[0];
    assert_eq!(vuln.vulnerability_type, "Reflected XSS - HTML Body");
    assert_eq!(vuln.severity, Severity::Medium);
    assert_eq!(vuln.parameter, "q");
    assert!(vuln.endpoint.ends_with("/search"));
    assert!(vuln.evidence.contains("<script>alert('XSS')</script>"));
    // Advisory fields stay empty without a summarizer.
    assert!(vuln.ai_summary.is_none());

    assert_eq!(scan.coverage.pages_crawled, 1);
    assert_eq!(scan.coverage.surfaces_probed, 1);
    assert_eq!(scan.coverage.surfaces_skipped, 0);
}

#[tokio::test]
async fn encoded_reflection_is_a_clean_scan() {
    let server = search_site(None).await;
    let store = Arc::new(MemoryScanStore::new());
    let scan = engine(store)
        .run(quick_request(&server), CancelToken::new())
        .await
        .unwrap();

    assert_eq!(scan.status, ScanStatus::Completed);
    assert!(scan.vulnerabilities.is_empty());
    assert_eq!(scan.coverage.surfaces_probed, 1);
}

#[tokio::test]
async fn unreachable_target_reports_target_unreachable() {
    let store = Arc::new(MemoryScanStore::new());
    let config = EngineConfig {
        timeout: Duration::from_millis(500),
        ..EngineConfig::default()
    };
    let request = ScanRequest {
        target_url: Url::parse("http://127.0.0.1:1/").unwrap(),
        scan_type: ScanType::Quick,
        options: ScanOptions::default(),
        custom_payloads: Vec::new(),
    };

    let scan = Engine::new(config, store.clone())
        .run(request, CancelToken::new())
        .await
        .unwrap();

    assert_eq!(scan.status, ScanStatus::Failed);
    assert_eq!(scan.failure_reason, Some(FailureReason::TargetUnreachable));
    assert!(scan.vulnerabilities.is_empty());
    assert_eq!(scan.coverage.surfaces_probed, 0);

    let stored = store.get(scan.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ScanStatus::Failed);
}

#[tokio::test]
async fn cancelled_scan_fails_with_cancelled_reason() {
    let server = search_site(None).await;
    let store = Arc::new(MemoryScanStore::new());
    let cancel = CancelToken::new();
    cancel.cancel();

    let scan = engine(store.clone())
        .run(quick_request(&server), cancel)
        .await
        .unwrap();

    assert_eq!(scan.status, ScanStatus::Failed);
    assert_eq!(scan.failure_reason, Some(FailureReason::Cancelled));
    assert!(scan.vulnerabilities.is_empty());

    let stored = store.get(scan.id).await.unwrap().unwrap();
    assert_eq!(stored.failure_reason, Some(FailureReason::Cancelled));
}

#[tokio::test]
async fn unbuildable_form_surface_counts_as_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><form action="/go" method="no such method"><input type="text" name="q"></form></body></html>"#,
        ))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryScanStore::new());
    let scan = engine(store)
        .run(quick_request(&server), CancelToken::new())
        .await
        .unwrap();

    // The form is discovered but no request for it can be built, so the
    // scan completes with the surface visible as skipped coverage.
    assert_eq!(scan.status, ScanStatus::Completed);
    assert!(scan.vulnerabilities.is_empty());
    assert_eq!(scan.coverage.surfaces_probed, 0);
    assert_eq!(scan.coverage.surfaces_skipped, 1);
}

#[tokio::test]
async fn mid_scan_cancellation_keeps_earlier_findings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FORM_PAGE))
        .mount(&server)
        .await;
    let cancel = CancelToken::new();
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(CancellingSearch {
            reflect: "<script>alert('XSS')</script>",
            token: cancel.clone(),
        })
        .mount(&server)
        .await;

    let store = Arc::new(MemoryScanStore::new());
    let config = EngineConfig {
        timeout: Duration::from_secs(5),
        concurrency: 1,
        ..EngineConfig::default()
    };
    let scan = Engine::new(config, store.clone())
        .run(quick_request(&server), cancel)
        .await
        .unwrap();

    assert_eq!(scan.status, ScanStatus::Failed);
    assert_eq!(scan.failure_reason, Some(FailureReason::Cancelled));
    // The finding confirmed before the interrupt survives.
    assert_eq!(scan.vulnerabilities.len(), 1);
    assert_eq!(
        scan.vulnerabilities[0].vulnerability_type,
        "Reflected XSS - HTML Body"
    );

    let stored = store.get(scan.id).await.unwrap().unwrap();
    assert_eq!(stored.failure_reason, Some(FailureReason::Cancelled));
    assert_eq!(stored.vulnerabilities.len(), 1);
}

#[tokio::test]
async fn mid_scan_snapshot_failures_do_not_fail_the_scan() {
    let server = search_site(Some("<script>alert('XSS')</script>")).await;
    // Saves land in order: pending, running, post-crawl, post-probe,
    // terminal. Knock out the two mid-scan snapshots.
    let store = Arc::new(FlakyStore::failing_saves(3, 4));
    let scan = Engine::new(
        EngineConfig {
            timeout: Duration::from_secs(5),
            ..EngineConfig::default()
        },
        store.clone(),
    )
    .run(quick_request(&server), CancelToken::new())
    .await
    .unwrap();

    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.vulnerabilities.len(), 1);

    let stored = store.get(scan.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ScanStatus::Completed);
    assert_eq!(stored.vulnerabilities.len(), 1);
}

#[tokio::test]
async fn summarizer_annotates_findings() {
    let server = search_site(Some("<script>alert('XSS')</script>")).await;
    let store = Arc::new(MemoryScanStore::new());
    let scan = engine(store)
        .with_summarizer(Arc::new(RuleBasedSummarizer::new()))
        .run(quick_request(&server), CancelToken::new())
        .await
        .unwrap();

    assert_eq!(scan.vulnerabilities.len(), 1);
    let vuln = &scan.vulnerabilities[0];
    assert!(vuln.ai_summary.as_deref().unwrap().contains("HTML Body"));
    assert!(vuln.remediation_suggestion.is_some());
    // Triage never changes the verdict itself.
    assert_eq!(vuln.severity, Severity::Medium);
}

#[tokio::test]
async fn store_snapshot_matches_the_returned_scan() {
    let server = search_site(Some("<script>alert('XSS')</script>")).await;
    let store = Arc::new(MemoryScanStore::new());
    let scan = engine(store.clone())
        .run(quick_request(&server), CancelToken::new())
        .await
        .unwrap();

    let stored = store.get(scan.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ScanStatus::Completed);
    assert_eq!(stored.vulnerabilities.len(), scan.vulnerabilities.len());
    assert_eq!(store.list().await.unwrap().len(), 1);
}
