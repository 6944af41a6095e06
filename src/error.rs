//! Engine error taxonomy.
//!
//! Only `TargetUnreachable` at the crawl root (and internal faults) surface
//! as scan-level failures; everything else is absorbed as reduced coverage.

use std::time::Duration;
use thiserror::Error;

/// Transport-level fetch failure. HTTP error statuses are not errors here;
/// they come back as normal responses.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("request blocked: {0} is outside the scan origin")]
    OutOfScope(String),
}

impl FetchError {
    /// Transient failures are worth retrying; scope violations are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Timeout(_) | FetchError::Network(_))
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("target unreachable: {url}: {source}")]
    TargetUnreachable {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to crawl {url}: {reason}")]
    CrawlPage { url: String, reason: String },

    #[error("cannot build a request for surface {parameter} at {endpoint}: {reason}")]
    MalformedSurface {
        endpoint: String,
        parameter: String,
        reason: String,
    },

    #[error("scan cancelled")]
    Cancelled,
}
