//! Breadth-first, same-origin crawler that turns pages into injection
//! surfaces.
//!
//! The crawl is sequential by depth layer; pages within a layer are fetched
//! concurrently up to a bounded worker count. Depth 0 means the target page
//! only. An unreachable non-root page is a logged skip; only an unreachable
//! root fails the crawl.

use std::collections::HashSet;

use futures::StreamExt;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::cancel::CancelToken;
use crate::error::ScanError;
use crate::http::{Fetcher, HttpRequest};
use crate::model::{Surface, SurfaceKind};
use crate::scope::Scope;

/// Form input types whose values an attacker plausibly controls.
const INJECTABLE_INPUT_TYPES: &[&str] = &["text", "search", "url", "email", "password", "hidden"];

#[derive(Debug, Default)]
pub struct CrawlReport {
    /// Deduplicated surfaces in discovery order.
    pub surfaces: Vec<Surface>,
    pub pages_crawled: usize,
    pub pages_skipped: usize,
}

pub struct Crawler {
    max_depth: usize,
    include_urls: bool,
    include_forms: bool,
    workers: usize,
}

impl Crawler {
    pub fn new(max_depth: usize, include_urls: bool, include_forms: bool, workers: usize) -> Self {
        Self {
            max_depth,
            include_urls,
            include_forms,
            workers: workers.max(1),
        }
    }

    pub async fn crawl(
        &self,
        fetcher: &Fetcher,
        target: &Url,
        scope: &Scope,
        cancel: &CancelToken,
    ) -> Result<CrawlReport, ScanError> {
        let mut report = CrawlReport::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut seen_surfaces: HashSet<(String, String, String)> = HashSet::new();
        let mut layer: Vec<Url> = vec![target.clone()];

        for depth in 0..=self.max_depth {
            layer.retain(|url| scope.permits(url) && visited.insert(url.to_string()));
            if layer.is_empty() || cancel.is_cancelled() {
                break;
            }
            debug!(depth, pages = layer.len(), "crawling layer");

            let results: Vec<(Url, Option<Result<crate::http::HttpResponse, _>>)> =
                futures::stream::iter(layer.drain(..))
                    .map(|url| async move {
                        if cancel.is_cancelled() {
                            return (url, None);
                        }
                        let resp = fetcher.fetch(&HttpRequest::get(url.clone())).await;
                        (url, Some(resp))
                    })
                    .buffered(self.workers)
                    .collect()
                    .await;

            let mut next_layer = Vec::new();

            for (url, outcome) in results {
                let resp = match outcome {
                    None => {
                        report.pages_skipped += 1;
                        continue;
                    }
                    Some(Err(err)) => {
                        if depth == 0 && url == *target {
                            return Err(ScanError::TargetUnreachable {
                                url: url.to_string(),
                                source: err,
                            });
                        }
                        warn!(%url, %err, "skipping unreachable page");
                        report.pages_skipped += 1;
                        continue;
                    }
                    Some(Ok(resp)) => resp,
                };

                if !resp.is_success() {
                    warn!(%url, status = resp.status, "skipping non-2xx page");
                    report.pages_skipped += 1;
                    continue;
                }

                report.pages_crawled += 1;

                let page = self.extract(&url, &resp.body, scope);
                for surface in page.surfaces {
                    if seen_surfaces.insert(surface.dedup_key()) {
                        report.surfaces.push(surface);
                    }
                }
                for link in page.links {
                    if !visited.contains(link.as_str()) {
                        next_layer.push(link);
                    }
                }
            }

            layer = next_layer;
        }

        Ok(report)
    }

    /// Synchronous HTML analysis of one fetched page. The parsed document
    /// never crosses an await point.
    fn extract(&self, page_url: &Url, body: &str, scope: &Scope) -> PageExtract {
        let mut out = PageExtract::default();

        if self.include_urls {
            for (name, value) in page_url.query_pairs() {
                out.surfaces.push(Surface {
                    kind: SurfaceKind::UrlParam,
                    location: page_url.clone(),
                    parameter: name.to_string(),
                    method: "GET".to_string(),
                    default_value: value.to_string(),
                    form_fields: Vec::new(),
                });
            }
        }

        let document = Html::parse_document(body);

        if self.include_urls {
            if let Ok(selector) = Selector::parse("a[href]") {
                for element in document.select(&selector) {
                    let Some(href) = element.value().attr("href") else {
                        continue;
                    };
                    let Ok(link) = page_url.join(href) else {
                        debug!(%page_url, href, "unparseable link");
                        continue;
                    };
                    if scope.permits(&link) {
                        out.links.push(link);
                    }
                }
            }
        }

        if self.include_forms {
            self.extract_forms(page_url, &document, scope, &mut out);
        }

        out
    }

    fn extract_forms(
        &self,
        page_url: &Url,
        document: &Html,
        scope: &Scope,
        out: &mut PageExtract,
    ) {
        let (Ok(form_sel), Ok(field_sel)) = (
            Selector::parse("form"),
            Selector::parse("input[name], textarea[name], select[name]"),
        ) else {
            return;
        };

        for form in document.select(&form_sel) {
            let action = form.value().attr("action").unwrap_or("");
            let Ok(location) = page_url.join(action) else {
                debug!(%page_url, action, "unparseable form action");
                continue;
            };
            if !scope.permits(&location) {
                debug!(%location, "skipping out-of-scope form action");
                continue;
            }

            let method = form
                .value()
                .attr("method")
                .unwrap_or("GET")
                .to_uppercase();

            let mut fields: Vec<(String, String, String)> = Vec::new();
            for field in form.select(&field_sel) {
                let Some(name) = field.value().attr("name") else {
                    continue;
                };
                let kind = match field.value().name() {
                    "input" => field.value().attr("type").unwrap_or("text").to_lowercase(),
                    other => other.to_string(),
                };
                let value = field.value().attr("value").unwrap_or("").to_string();
                fields.push((name.to_string(), kind, value));
            }

            let defaults: Vec<(String, String)> = fields
                .iter()
                .map(|(name, _, value)| (name.clone(), value.clone()))
                .collect();

            for (name, kind, value) in &fields {
                let injectable = match kind.as_str() {
                    "textarea" | "select" => true,
                    t => INJECTABLE_INPUT_TYPES.contains(&t),
                };
                if !injectable {
                    continue;
                }
                out.surfaces.push(Surface {
                    kind: SurfaceKind::FormField,
                    location: location.clone(),
                    parameter: name.clone(),
                    method: method.clone(),
                    default_value: value.clone(),
                    form_fields: defaults.clone(),
                });
            }
        }
    }
}

#[derive(Debug, Default)]
struct PageExtract {
    surfaces: Vec<Surface>,
    links: Vec<Url>,
}
