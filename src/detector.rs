//! Reflection analysis: decides whether an injected payload landed in a
//! dangerous HTML context with its special characters still live.
//!
//! The classifier works from the raw response text around each literal
//! occurrence of the payload. A payload that only appears entity-encoded
//! (`&lt;script&gt;...`) is not a finding. Severity follows a fixed
//! context table, so the same probe always produces the same verdict.

use std::collections::HashSet;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::model::{Probe, Severity, Vulnerability};

/// Half-width of the evidence window captured around a reflection.
const EVIDENCE_RADIUS: usize = 80;

/// Attributes whose values are interpreted as URLs.
const URL_ATTRIBUTES: &[&str] = &[
    "href", "src", "action", "formaction", "data", "poster", "background", "cite",
];

/// Where in the response a payload reflection landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReflectionContext {
    /// Inside a `<script>` block: the payload is already JavaScript.
    ScriptBlock,
    /// Inside an `on*` event-handler attribute value.
    EventHandler,
    /// Inside an ordinary attribute value, with a quote breakout available.
    AttributeBreakout,
    /// Inside a URL-valued attribute (`href`, `src`, ...).
    UrlAttribute,
    /// Plain HTML body text between tags.
    HtmlBody,
}

impl ReflectionContext {
    /// Fixed context-to-severity table.
    pub fn severity(self) -> Severity {
        match self {
            ReflectionContext::ScriptBlock | ReflectionContext::EventHandler => Severity::Critical,
            ReflectionContext::AttributeBreakout => Severity::High,
            ReflectionContext::HtmlBody => Severity::Medium,
            ReflectionContext::UrlAttribute => Severity::Low,
        }
    }

    pub fn vulnerability_type(self) -> &'static str {
        match self {
            ReflectionContext::ScriptBlock => "Reflected XSS - Script Block",
            ReflectionContext::EventHandler => "Reflected XSS - Event Handler",
            ReflectionContext::AttributeBreakout => "Reflected XSS - Attribute Injection",
            ReflectionContext::UrlAttribute => "Reflected XSS - URL Context",
            ReflectionContext::HtmlBody => "Reflected XSS - HTML Body",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Detector;

impl Detector {
    pub fn new() -> Self {
        Self
    }

    /// Inspect one probe. Emits one vulnerability per distinct context the
    /// payload reflected into; deterministic for identical input.
    pub fn detect(&self, scan_id: Uuid, probe: &Probe) -> Vec<Vulnerability> {
        let body = &probe.response_body;
        let payload = &probe.payload.value;

        if body.is_empty() || payload.is_empty() {
            return Vec::new();
        }
        if !body.contains(payload.as_str()) {
            if is_entity_encoded(body, payload) {
                debug!(
                    endpoint = %probe.surface.endpoint(),
                    parameter = %probe.surface.parameter,
                    "reflection neutralized by entity encoding"
                );
            }
            return Vec::new();
        }

        let mut findings = Vec::new();
        let mut seen_contexts: HashSet<ReflectionContext> = HashSet::new();

        for (pos, _) in body.match_indices(payload.as_str()) {
            let Some(context) = classify_at(body, pos, payload) else {
                continue;
            };
            if !seen_contexts.insert(context) {
                continue;
            }

            findings.push(Vulnerability {
                id: Uuid::new_v4(),
                scan_id,
                vulnerability_type: context.vulnerability_type().to_string(),
                severity: context.severity(),
                endpoint: probe.surface.endpoint(),
                parameter: probe.surface.parameter.clone(),
                payload: payload.clone(),
                evidence: evidence_window(body, pos, payload.len()),
                ai_summary: None,
                remediation_suggestion: None,
                created_at: Utc::now(),
            });
        }

        findings
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

/// True when the payload's markup characters only survive entity-encoded.
fn is_entity_encoded(body: &str, payload: &str) -> bool {
    if body.contains(payload) {
        return false;
    }
    let encoded = payload
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;");
    encoded != payload && body.contains(&encoded)
}

/// Classify the context around one literal occurrence of the payload, or
/// `None` when the reflection is not exploitable there.
fn classify_at(body: &str, pos: usize, payload: &str) -> Option<ReflectionContext> {
    let before = &body[..pos];

    if inside_script_block(before) {
        return Some(ReflectionContext::ScriptBlock);
    }

    if let Some(attr) = enclosing_attribute(before) {
        if attr.name.starts_with("on") {
            return Some(ReflectionContext::EventHandler);
        }
        // Breaking out of the value needs the enclosing quote to be live in
        // the payload (or no quoting at all).
        let breakout = match attr.quote {
            Some(q) => payload.contains(q),
            None => payload.contains(|c: char| c.is_whitespace()) || payload.contains('>'),
        };
        if breakout {
            return Some(ReflectionContext::AttributeBreakout);
        }
        if URL_ATTRIBUTES.contains(&attr.name.as_str()) {
            // Browsers tolerate case and embedded whitespace in the scheme.
            let scheme: String = payload
                .to_lowercase()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            if scheme.starts_with("javascript:") || scheme.starts_with("data:") {
                return Some(ReflectionContext::UrlAttribute);
            }
        }
        return None;
    }

    // Body text: only markup injection executes here.
    if payload.contains('<') && payload.contains('>') {
        return Some(ReflectionContext::HtmlBody);
    }

    None
}

/// The reflection sits in an open `<script>` block when the last opening
/// tag before it has no matching close.
fn inside_script_block(before: &str) -> bool {
    let lower = before.to_lowercase();
    match (lower.rfind("<script"), lower.rfind("</script")) {
        (Some(open), Some(close)) => open > close,
        (Some(_), None) => true,
        _ => false,
    }
}

struct AttributePosition {
    name: String,
    quote: Option<char>,
}

/// If the position is inside a tag's attribute value, report the attribute
/// name and its quoting. Works on the text before the reflection only, so
/// markup inside the payload cannot confuse it.
fn enclosing_attribute(before: &str) -> Option<AttributePosition> {
    let tag_start = before.rfind('<')?;
    if before[tag_start..].contains('>') {
        return None; // the nearest tag is already closed; we are body text
    }

    let tag_fragment = &before[tag_start..];
    let eq = tag_fragment.rfind('=')?;
    let name_part = &tag_fragment[..eq];
    let name = name_part
        .rsplit(|c: char| c.is_whitespace())
        .next()?
        .trim()
        .to_lowercase();
    if name.is_empty() || name.starts_with('<') {
        return None;
    }

    let after_eq = tag_fragment[eq + 1..].trim_start();
    let quote = match after_eq.chars().next() {
        Some(c @ ('"' | '\'')) => {
            // An even number of this quote after `=` means the value closed
            // before our position, i.e. we are not inside it.
            let count = after_eq.matches(c).count();
            if count % 2 == 0 {
                return None;
            }
            Some(c)
        }
        _ => None,
    };

    Some(AttributePosition { name, quote })
}

/// Minimal surrounding text window, bounded and char-boundary safe.
fn evidence_window(body: &str, pos: usize, payload_len: usize) -> String {
    let mut start = pos.saturating_sub(EVIDENCE_RADIUS);
    let mut end = (pos + payload_len + EVIDENCE_RADIUS).min(body.len());
    while start > 0 && !body.is_char_boundary(start) {
        start -= 1;
    }
    while end < body.len() && !body.is_char_boundary(end) {
        end += 1;
    }
    body[start..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{Payload, PayloadContext, RiskTier};
    use crate::model::{Surface, SurfaceKind};
    use url::Url;

    fn probe_with(payload: &str, body: &str) -> Probe {
        Probe {
            surface: Surface {
                kind: SurfaceKind::UrlParam,
                location: Url::parse("http://example.test/search?q=x").unwrap(),
                parameter: "q".to_string(),
                method: "GET".to_string(),
                default_value: "x".to_string(),
                form_fields: Vec::new(),
            },
            payload: Payload {
                value: payload.to_string(),
                context: PayloadContext::HtmlBody,
                tier: RiskTier::Basic,
            },
            status: 200,
            response_body: body.to_string(),
            sent_at: Utc::now(),
        }
    }

    fn detect(payload: &str, body: &str) -> Vec<Vulnerability> {
        Detector::new().detect(Uuid::new_v4(), &probe_with(payload, body))
    }

    #[test]
    fn body_reflection_is_medium() {
        let findings = detect(
            "<script>alert(1)</script>",
            "<html><body>You searched for <script>alert(1)</script></body></html>",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert_eq!(findings[0].vulnerability_type, "Reflected XSS - HTML Body");
        assert_eq!(findings[0].parameter, "q");
    }

    #[test]
    fn entity_encoded_reflection_is_not_a_finding() {
        let findings = detect(
            "<script>alert(1)</script>",
            "<body>&lt;script&gt;alert(1)&lt;/script&gt;</body>",
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn script_block_reflection_is_critical() {
        let findings = detect(
            "';alert(1);//",
            "<script>var q = '';alert(1);//';</script>",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(
            findings[0].vulnerability_type,
            "Reflected XSS - Script Block"
        );
    }

    #[test]
    fn event_handler_reflection_is_critical() {
        let findings = detect(
            "alert(1)",
            r#"<img src=x onerror="alert(1)">"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(
            findings[0].vulnerability_type,
            "Reflected XSS - Event Handler"
        );
    }

    #[test]
    fn attribute_breakout_is_high() {
        let findings = detect(
            r#"" onmouseover=alert(1) x=""#,
            r#"<input value="" onmouseover=alert(1) x="">"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[test]
    fn quoted_attribute_without_breakout_is_inert() {
        // Payload reflected inside a double-quoted value but carries no
        // double quote: it cannot escape.
        let findings = detect("hello<b>", r#"<input value="hello<b>">"#);
        assert!(findings.is_empty());
    }

    #[test]
    fn obfuscated_url_schemes_are_still_low() {
        // Mixed case and embedded whitespace must not hide the scheme.
        let findings = detect(
            "JaVaScRiPt:alert(1)",
            r#"<a href="JaVaScRiPt:alert(1)">link</a>"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Low);

        let findings = detect(
            "java\tscript:alert(1)",
            "<a href=\"java\tscript:alert(1)\">link</a>",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].vulnerability_type, "Reflected XSS - URL Context");

        let findings = detect(
            "DATA:text/html,<b>x</b>",
            r#"<a href="DATA:text/html,<b>x</b>">link</a>"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Low);
    }

    #[test]
    fn javascript_url_in_href_is_low() {
        let findings = detect(
            "javascript:alert(1)",
            r#"<a href="javascript:alert(1)">link</a>"#,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Low);
        assert_eq!(findings[0].vulnerability_type, "Reflected XSS - URL Context");
    }

    #[test]
    fn plain_text_payload_in_body_is_not_a_finding() {
        let findings = detect("justtext", "<body>justtext</body>");
        assert!(findings.is_empty());
    }

    #[test]
    fn one_finding_per_distinct_context() {
        // Same payload reflected twice in body text: one finding.
        let body = "<body><script>alert(1)</script> and again <script>alert(1)</script></body>";
        let findings = detect("<script>alert(1)</script>", body);
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn distinct_contexts_each_produce_a_finding() {
        let body = concat!(
            r#"<body><script>var x = 'PAYLOAD';</script>"#,
            r#"PAYLOAD</body>"#,
        )
        .replace("PAYLOAD", "<script>alert(1)</script>");
        let findings = detect("<script>alert(1)</script>", &body);
        let contexts: Vec<&str> = findings
            .iter()
            .map(|f| f.vulnerability_type.as_str())
            .collect();
        assert_eq!(findings.len(), 2);
        assert!(contexts.contains(&"Reflected XSS - Script Block"));
        assert!(contexts.contains(&"Reflected XSS - HTML Body"));
    }

    #[test]
    fn detection_is_idempotent() {
        let probe = probe_with(
            "<script>alert(1)</script>",
            "<body><script>alert(1)</script></body>",
        );
        let detector = Detector::new();
        let scan_id = Uuid::new_v4();
        let first = detector.detect(scan_id, &probe);
        let second = detector.detect(scan_id, &probe);
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].severity, second[0].severity);
        assert_eq!(first[0].evidence, second[0].evidence);
    }

    #[test]
    fn evidence_is_bounded() {
        let padding = "a".repeat(4000);
        let body = format!("{}<script>alert(1)</script>{}", padding, padding);
        let findings = detect("<script>alert(1)</script>", &body);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].evidence.len() <= 2 * EVIDENCE_RADIUS + "<script>alert(1)</script>".len());
        assert!(findings[0].evidence.contains("<script>alert(1)</script>"));
    }

    #[test]
    fn entity_encoding_helper() {
        assert!(is_entity_encoded(
            "&lt;script&gt;",
            "<script>"
        ));
        assert!(!is_entity_encoded("<script>", "<script>"));
        assert!(!is_entity_encoded("nothing here", "<script>"));
    }

    #[test]
    fn empty_probe_body_yields_nothing() {
        let findings = detect("<script>alert(1)</script>", "");
        assert!(findings.is_empty());
    }
}
