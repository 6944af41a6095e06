//! HTTP fetcher with scope enforcement, per-request timeout, and bounded
//! retries for transient network failures.

use std::time::{Duration, Instant};

use anyhow::Result;
use reqwest::{header, redirect::Policy, Client};
use tracing::debug;

use crate::error::FetchError;
use crate::http::rate_limit::RateLimiter;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::scope::Scope;

/// Retries apply to transient network errors only, never to 4xx/5xx
/// application responses.
const MAX_RETRIES: u32 = 2;
const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(250);

const USER_AGENT: &str = concat!("xspect/", env!("CARGO_PKG_VERSION"));

pub struct Fetcher {
    client: Client,
    scope: Scope,
    limiter: RateLimiter,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(scope: Scope, timeout: Duration, limiter: RateLimiter) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(Policy::none())
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            scope,
            limiter,
            timeout,
        })
    }

    /// Execute a request, retrying transient failures with exponential
    /// backoff. Any HTTP status comes back as `Ok`; only transport-level
    /// problems are errors.
    pub async fn fetch(&self, req: &HttpRequest) -> Result<HttpResponse, FetchError> {
        if !self.scope.permits(&req.url) {
            return Err(FetchError::OutOfScope(req.url.to_string()));
        }

        let mut attempt = 0;
        loop {
            match self.dispatch(req).await {
                Ok(resp) => return Ok(resp),
                Err(err) if err.is_transient() && attempt < MAX_RETRIES => {
                    let backoff = RETRY_BACKOFF_BASE * 2u32.pow(attempt);
                    debug!(url = %req.url, %err, attempt, "transient fetch error, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn dispatch(&self, req: &HttpRequest) -> Result<HttpResponse, FetchError> {
        self.limiter.wait().await;

        let start = Instant::now();

        let mut builder = self
            .client
            .request(req.method.clone(), req.url.clone())
            .headers(req.headers.clone())
            .header(header::USER_AGENT, USER_AGENT);

        if let Some(body) = &req.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;

        let status = response.status().as_u16();
        let mut headers = std::collections::HashMap::new();
        for (k, v) in response.headers() {
            headers.insert(
                k.as_str().to_ascii_lowercase(),
                v.to_str().unwrap_or_default().to_string(),
            );
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
            elapsed: start.elapsed(),
        })
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Network(err.to_string())
        }
    }
}
