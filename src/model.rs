//! Scan data model: targets, surfaces, probes, vulnerabilities, and the
//! scan lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::corpus::Payload;
use crate::http::response::HttpResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    Quick,
    Comprehensive,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Why a scan ended in `Failed`. Cancellation is kept distinct from a true
/// failure so reports can tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    TargetUnreachable,
    Cancelled,
    Internal(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::TargetUnreachable => write!(f, "target unreachable"),
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    /// Query-string parameter on a discovered link or the target itself.
    UrlParam,
    /// Named input field of a discovered `<form>`.
    FormField,
}

/// An injectable point discovered by the crawler.
///
/// Surfaces are deduplicated by `(location without query, method, parameter)`.
/// For form fields, `form_fields` carries every field of the enclosing form
/// with its default value so sibling fields can be held steady while one is
/// injected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Surface {
    pub kind: SurfaceKind,
    pub location: Url,
    pub parameter: String,
    pub method: String,
    pub default_value: String,
    #[serde(default)]
    pub form_fields: Vec<(String, String)>,
}

impl Surface {
    /// Identity used for deduplication. The query string is stripped so that
    /// `/search?q=1` and `/search?q=2` collapse into one surface.
    pub fn dedup_key(&self) -> (String, String, String) {
        let mut location = self.location.clone();
        location.set_query(None);
        location.set_fragment(None);
        (
            location.to_string(),
            self.method.clone(),
            self.parameter.clone(),
        )
    }

    /// Endpoint string used in findings: location without the query string.
    pub fn endpoint(&self) -> String {
        let mut location = self.location.clone();
        location.set_query(None);
        location.set_fragment(None);
        location.to_string()
    }
}

/// One trial injection of a payload into a surface. Transient: consumed by
/// the detector and then discarded, never persisted.
#[derive(Debug, Clone)]
pub struct Probe {
    pub surface: Surface,
    pub payload: Payload,
    /// 0 when the request errored or timed out before a response arrived.
    pub status: u16,
    /// Empty when the request errored or timed out.
    pub response_body: String,
    pub sent_at: DateTime<Utc>,
}

impl Probe {
    pub fn from_response(surface: Surface, payload: Payload, resp: HttpResponse) -> Self {
        Self {
            surface,
            payload,
            status: resp.status,
            response_body: resp.body,
            sent_at: Utc::now(),
        }
    }

    /// Probe whose request never produced a response.
    pub fn inconclusive(surface: Surface, payload: Payload) -> Self {
        Self {
            surface,
            payload,
            status: 0,
            response_body: String::new(),
            sent_at: Utc::now(),
        }
    }
}

/// A confirmed finding. Immutable after creation except for the advisory AI
/// fields, which are filled in additively by the triage hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub vulnerability_type: String,
    pub severity: Severity,
    pub endpoint: String,
    pub parameter: String,
    pub payload: String,
    pub evidence: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation_suggestion: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub include_forms: bool,
    pub include_urls: bool,
    pub max_depth: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include_forms: true,
            include_urls: true,
            max_depth: 2,
        }
    }
}

/// Scan submission accepted from the outside.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub target_url: Url,
    pub scan_type: ScanType,
    pub options: ScanOptions,
    pub custom_payloads: Vec<String>,
}

/// How much of the target was actually exercised. A completed scan always
/// reports probed vs skipped so partial coverage stays observable.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Coverage {
    pub pages_crawled: usize,
    pub pages_skipped: usize,
    pub surfaces_probed: usize,
    pub surfaces_skipped: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid scan transition: {from:?} -> {to:?}")]
    InvalidTransition { from: ScanStatus, to: ScanStatus },
    #[error("scan is already terminal ({0:?})")]
    Terminal(ScanStatus),
}

/// A scan and its lifecycle. Status moves monotonically through
/// pending -> running -> completed | failed; terminal states are final and
/// reject further vulnerability appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub target_url: Url,
    pub scan_type: ScanType,
    pub options: ScanOptions,
    pub status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub coverage: Coverage,
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(skip)]
    pub custom_payloads: Vec<String>,
}

impl Scan {
    pub fn new(request: ScanRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_url: request.target_url,
            scan_type: request.scan_type,
            options: request.options,
            status: ScanStatus::Pending,
            failure_reason: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            coverage: Coverage::default(),
            vulnerabilities: Vec::new(),
            custom_payloads: request.custom_payloads,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ScanStatus::Completed | ScanStatus::Failed)
    }

    pub fn start(&mut self) -> Result<(), StateError> {
        match self.status {
            ScanStatus::Pending => {
                self.status = ScanStatus::Running;
                self.started_at = Some(Utc::now());
                Ok(())
            }
            from => Err(StateError::InvalidTransition {
                from,
                to: ScanStatus::Running,
            }),
        }
    }

    pub fn complete(&mut self) -> Result<(), StateError> {
        match self.status {
            ScanStatus::Running => {
                self.status = ScanStatus::Completed;
                self.completed_at = Some(Utc::now());
                Ok(())
            }
            from => Err(StateError::InvalidTransition {
                from,
                to: ScanStatus::Completed,
            }),
        }
    }

    pub fn fail(&mut self, reason: FailureReason) -> Result<(), StateError> {
        match self.status {
            ScanStatus::Pending | ScanStatus::Running => {
                self.status = ScanStatus::Failed;
                self.failure_reason = Some(reason);
                self.completed_at = Some(Utc::now());
                Ok(())
            }
            from => Err(StateError::InvalidTransition {
                from,
                to: ScanStatus::Failed,
            }),
        }
    }

    /// Append a finding. Rejected once the scan is terminal.
    pub fn push_vulnerability(&mut self, vuln: Vulnerability) -> Result<(), StateError> {
        if self.is_terminal() {
            return Err(StateError::Terminal(self.status));
        }
        self.vulnerabilities.push(vuln);
        Ok(())
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.vulnerabilities
            .iter()
            .filter(|v| v.severity == severity)
            .count()
    }

    pub fn duration_secs(&self) -> Option<f64> {
        let (start, end) = (self.started_at?, self.completed_at?);
        Some((end - start).num_milliseconds() as f64 / 1000.0)
    }
}
