//! Scan engine: drives crawl, inject, detect, and triage for one scan and
//! keeps its lifecycle and store snapshots consistent.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::corpus::{Payload, PayloadCorpus};
use crate::crawler::Crawler;
use crate::detector::Detector;
use crate::error::ScanError;
use crate::http::rate_limit::RateLimiter;
use crate::http::Fetcher;
use crate::injector;
use crate::model::{FailureReason, Scan, ScanRequest, Surface};
use crate::scope::Scope;
use crate::store::ScanStore;
use crate::triage::{self, Summarizer};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-request timeout for crawl and probe traffic.
    pub timeout: Duration,
    /// Requests per second cap; 0 disables rate limiting.
    pub rate: u32,
    /// In-flight probe requests.
    pub concurrency: usize,
    /// In-flight crawl requests within one depth layer.
    pub crawl_workers: usize,
    /// Per-finding deadline for the triage hook.
    pub triage_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            rate: 0,
            concurrency: 8,
            crawl_workers: 4,
            triage_timeout: triage::TRIAGE_TIMEOUT,
        }
    }
}

/// The scan engine. One engine can run many scans; each run drives a single
/// scan from pending to a terminal state and snapshots it into the store at
/// every phase boundary.
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn ScanStore>,
    summarizer: Option<Arc<dyn Summarizer>>,
    detector: Detector,
}

impl Engine {
    pub fn new(config: EngineConfig, store: Arc<dyn ScanStore>) -> Self {
        Self {
            config,
            store,
            summarizer: None,
            detector: Detector::new(),
        }
    }

    /// Enable the advisory triage step on completed scans.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Run one scan to a terminal state. The returned scan is always
    /// `Completed` or `Failed`; an `Err` means a store or engine fault, not
    /// a scan outcome.
    pub async fn run(&self, request: ScanRequest, cancel: CancelToken) -> Result<Scan> {
        let mut scan = Scan::new(request);
        self.store.save(&scan).await?;

        if cancel.is_cancelled() {
            scan.fail(FailureReason::Cancelled)?;
            self.store.save(&scan).await?;
            return Ok(scan);
        }

        scan.start()?;
        self.store.save(&scan).await?;
        info!(scan_id = %scan.id, target = %scan.target_url, "scan started");

        match self.execute(&mut scan, &cancel).await {
            Ok(()) => {
                scan.complete()?;
            }
            Err(outcome) => {
                let reason = match outcome {
                    ScanError::TargetUnreachable { ref url, ref source } => {
                        warn!(%url, error = %source, "target unreachable");
                        FailureReason::TargetUnreachable
                    }
                    ScanError::Cancelled => FailureReason::Cancelled,
                    other => FailureReason::Internal(other.to_string()),
                };
                scan.fail(reason)?;
            }
        }

        self.store.save(&scan).await?;
        info!(
            scan_id = %scan.id,
            status = ?scan.status,
            findings = scan.vulnerabilities.len(),
            "scan finished"
        );
        Ok(scan)
    }

    async fn execute(&self, scan: &mut Scan, cancel: &CancelToken) -> Result<(), ScanError> {
        let scope = Scope::new(&scan.target_url).map_err(|e| ScanError::CrawlPage {
            url: scan.target_url.to_string(),
            reason: e.to_string(),
        })?;
        let fetcher = Fetcher::new(
            scope.clone(),
            self.config.timeout,
            RateLimiter::new(self.config.rate),
        )
        .map_err(|e| ScanError::CrawlPage {
            url: scan.target_url.to_string(),
            reason: e.to_string(),
        })?;

        let crawler = Crawler::new(
            scan.options.max_depth,
            scan.options.include_urls,
            scan.options.include_forms,
            self.config.crawl_workers,
        );
        let report = crawler
            .crawl(&fetcher, &scan.target_url, &scope, cancel)
            .await?;
        scan.coverage.pages_crawled = report.pages_crawled;
        scan.coverage.pages_skipped = report.pages_skipped;
        if let Err(err) = self.store.save(scan).await {
            warn!(scan_id = %scan.id, error = %err, "mid-scan snapshot failed");
        }

        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let payloads = PayloadCorpus::builtin().select(scan.scan_type, &scan.custom_payloads);
        debug!(
            surfaces = report.surfaces.len(),
            payloads = payloads.len(),
            "probing surfaces"
        );

        self.probe_surfaces(scan, &fetcher, report.surfaces, &payloads, cancel)
            .await;
        if let Err(err) = self.store.save(scan).await {
            warn!(scan_id = %scan.id, error = %err, "mid-scan snapshot failed");
        }

        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        if let Some(summarizer) = &self.summarizer {
            triage::annotate(
                summarizer.as_ref(),
                &mut scan.vulnerabilities,
                self.config.triage_timeout,
            )
            .await;
        }

        Ok(())
    }

    /// Probe every surface with every selected payload. Probes run
    /// concurrently but detection consumes them in discovery order, so the
    /// findings list is deterministic for a given target. A surface counts
    /// as probed only when at least one of its requests was actually built
    /// and dispatched; cancellation and unbuildable surfaces count as
    /// skipped.
    async fn probe_surfaces(
        &self,
        scan: &mut Scan,
        fetcher: &Fetcher,
        surfaces: Vec<Surface>,
        payloads: &[Payload],
        cancel: &CancelToken,
    ) {
        let total_surfaces = surfaces.len();
        let pairs: Vec<(usize, &Surface, &Payload)> = surfaces
            .iter()
            .enumerate()
            .flat_map(|(idx, surface)| payloads.iter().map(move |p| (idx, surface, p)))
            .collect();

        let probes: Vec<(usize, Option<_>)> = futures::stream::iter(pairs)
            .map(|(idx, surface, payload)| async move {
                if cancel.is_cancelled() {
                    return (idx, None);
                }
                (idx, Some(injector::probe(fetcher, surface, payload).await))
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut probed: std::collections::HashSet<usize> = std::collections::HashSet::new();
        for (idx, outcome) in probes {
            let Some(outcome) = outcome else { continue };
            let probe = match outcome {
                Ok(probe) => {
                    probed.insert(idx);
                    probe
                }
                Err(err) => {
                    warn!(error = %err, "skipping malformed surface");
                    continue;
                }
            };
            for vuln in self.detector.detect(scan.id, &probe) {
                info!(
                    endpoint = %vuln.endpoint,
                    parameter = %vuln.parameter,
                    severity = %vuln.severity,
                    kind = %vuln.vulnerability_type,
                    "vulnerability confirmed"
                );
                // push only fails on a terminal scan, which run() precludes
                scan.push_vulnerability(vuln).ok();
            }
        }

        scan.coverage.surfaces_probed = probed.len();
        scan.coverage.surfaces_skipped = total_surfaces - probed.len();
    }
}
