//! Advisory triage notes for confirmed findings.
//!
//! A `Summarizer` turns a finding into a human-readable note after detection
//! has already decided the verdict. The hook is strictly additive: it fills
//! the advisory fields or leaves them empty, never changes severity,
//! evidence, or the finding count, and a slow or failing backend cannot
//! stall the scan past its deadline.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::model::{Severity, Vulnerability};

/// Default per-finding deadline for a summarizer call.
pub const TRIAGE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TriageNote {
    pub summary: String,
    pub remediation: String,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, vuln: &Vulnerability) -> Result<TriageNote>;
}

/// Annotate findings in place. Each call is bounded by `timeout`; a timeout
/// or error leaves that finding's advisory fields untouched and moves on.
pub async fn annotate(
    summarizer: &dyn Summarizer,
    vulns: &mut [Vulnerability],
    timeout: Duration,
) {
    for vuln in vulns.iter_mut() {
        match tokio::time::timeout(timeout, summarizer.summarize(vuln)).await {
            Ok(Ok(note)) => {
                vuln.ai_summary = Some(note.summary);
                vuln.remediation_suggestion = Some(note.remediation);
            }
            Ok(Err(err)) => {
                warn!(endpoint = %vuln.endpoint, error = %err, "triage failed for finding");
            }
            Err(_) => {
                warn!(endpoint = %vuln.endpoint, "triage timed out for finding");
            }
        }
    }
}

/// Template-based summarizer. Produces deterministic notes from the finding's
/// context and severity, with no network dependency.
#[derive(Debug, Default, Clone)]
pub struct RuleBasedSummarizer;

impl RuleBasedSummarizer {
    pub fn new() -> Self {
        Self
    }

    fn impact(severity: Severity) -> &'static str {
        match severity {
            Severity::Critical => {
                "Immediate JavaScript execution without user interaction. An attacker \
                 can steal session cookies, redirect users, or act as the victim."
            }
            Severity::High => {
                "JavaScript execution after breaking out of the surrounding markup. \
                 An attacker can hijack sessions or manipulate page content."
            }
            Severity::Medium => {
                "Injected markup renders in the page body. Script execution is likely \
                 unless a Content Security Policy blocks it."
            }
            Severity::Low => {
                "The reflection requires user interaction or specific browser behavior \
                 to execute. Exploitable in targeted scenarios."
            }
        }
    }

    fn remediation(vuln: &Vulnerability) -> String {
        let context_advice = if vuln.vulnerability_type.contains("Script Block") {
            "JavaScript-encode user input embedded in script blocks (escape \\ \" ' and newlines), or move the data into a JSON script tag."
        } else if vuln.vulnerability_type.contains("URL Context") {
            "Validate URL-valued parameters against an allow-list of schemes (http, https) before writing them into href or src attributes."
        } else if vuln.vulnerability_type.contains("Attribute")
            || vuln.vulnerability_type.contains("Event Handler")
        {
            "HTML-attribute-encode user input and always quote attribute values; never place user input inside event handler attributes."
        } else {
            "HTML-encode < > \" ' & on output so reflected input renders as text."
        };
        format!(
            "{} Additionally deploy a Content-Security-Policy header and mark session \
             cookies HttpOnly to limit the blast radius.",
            context_advice
        )
    }
}

#[async_trait]
impl Summarizer for RuleBasedSummarizer {
    async fn summarize(&self, vuln: &Vulnerability) -> Result<TriageNote> {
        let summary = format!(
            "{} in parameter '{}' at {}. {}",
            vuln.vulnerability_type,
            vuln.parameter,
            vuln.endpoint,
            Self::impact(vuln.severity),
        );
        Ok(TriageNote {
            summary,
            remediation: Self::remediation(vuln),
        })
    }
}
