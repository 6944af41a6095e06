use unicode_width::UnicodeWidthStr;

use crate::model::{Scan, ScanStatus, Severity};

const BOX_WIDTH: usize = 70;
const INNER_WIDTH: usize = BOX_WIDTH - 2;
const EVIDENCE_PREVIEW: usize = 160;

fn top_border() -> String {
    format!("╔{}╗", "═".repeat(INNER_WIDTH))
}

fn middle_border() -> String {
    format!("╠{}╣", "═".repeat(INNER_WIDTH))
}

fn bottom_border() -> String {
    format!("╚{}╝", "═".repeat(INNER_WIDTH))
}

fn box_line(content: &str) -> String {
    let padded = format!(" {} ", content);
    let width = UnicodeWidthStr::width(padded.as_str());
    let padding = INNER_WIDTH.saturating_sub(width);
    format!("║{}{}║", padded, " ".repeat(padding))
}

fn box_line_centered(content: &str) -> String {
    let padded = format!(" {} ", content);
    let width = UnicodeWidthStr::width(padded.as_str());
    if width >= INNER_WIDTH {
        return box_line(content);
    }
    let remaining = INNER_WIDTH - width;
    format!(
        "║{}{}{}║",
        " ".repeat(remaining / 2),
        padded,
        " ".repeat(remaining - remaining / 2)
    )
}

fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "🔴",
        Severity::High => "🟠",
        Severity::Medium => "🟡",
        Severity::Low => "🟢",
    }
}

fn truncate_display(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

pub fn render(scan: &Scan) -> String {
    let mut out = String::new();
    let mut line = |s: String| {
        out.push_str(&s);
        out.push('\n');
    };

    line(top_border());
    match scan.status {
        ScanStatus::Completed if scan.vulnerabilities.is_empty() => {
            line(box_line_centered("SCAN COMPLETE"));
            line(middle_border());
            line(box_line("✅ No vulnerabilities detected"));
        }
        ScanStatus::Completed => {
            line(box_line_centered("SECURITY VULNERABILITIES DETECTED"));
            line(middle_border());
            line(box_line(&format!(
                "Total findings: {}",
                scan.vulnerabilities.len()
            )));
            for severity in [
                Severity::Critical,
                Severity::High,
                Severity::Medium,
                Severity::Low,
            ] {
                let count = scan.count_by_severity(severity);
                if count > 0 {
                    line(box_line(&format!(
                        "{} {}: {}",
                        severity_marker(severity),
                        severity,
                        count
                    )));
                }
            }
        }
        _ => {
            line(box_line_centered("SCAN DID NOT COMPLETE"));
            line(middle_border());
            line(box_line(&format!("Status: {:?}", scan.status)));
            if let Some(reason) = &scan.failure_reason {
                line(box_line(&format!("Reason: {}", reason)));
            }
            if !scan.vulnerabilities.is_empty() {
                line(box_line(&format!(
                    "Findings before interruption: {}",
                    scan.vulnerabilities.len()
                )));
            }
        }
    }
    line(middle_border());
    line(box_line(&format!("Target: {}", scan.target_url)));
    line(box_line(&format!(
        "Pages crawled: {} (skipped: {})",
        scan.coverage.pages_crawled, scan.coverage.pages_skipped
    )));
    line(box_line(&format!(
        "Surfaces probed: {} (skipped: {})",
        scan.coverage.surfaces_probed, scan.coverage.surfaces_skipped
    )));
    if let Some(duration) = scan.duration_secs() {
        line(box_line(&format!("Duration: {:.2}s", duration)));
    }
    line(bottom_border());

    for (idx, vuln) in scan.vulnerabilities.iter().enumerate() {
        line(String::new());
        line("═".repeat(BOX_WIDTH));
        line(format!(
            "[{}] {} {} ({})",
            idx + 1,
            severity_marker(vuln.severity),
            vuln.vulnerability_type,
            vuln.severity
        ));
        line("═".repeat(BOX_WIDTH));
        line(format!("Endpoint:  {}", vuln.endpoint));
        line(format!("Parameter: {}", vuln.parameter));
        line(format!("Payload:   {}", vuln.payload));
        line(format!(
            "Evidence:  {}",
            truncate_display(&vuln.evidence, EVIDENCE_PREVIEW)
        ));
        if let Some(summary) = &vuln.ai_summary {
            line(String::new());
            line("SUMMARY:".to_string());
            for text in summary.lines() {
                line(format!("  {}", text));
            }
        }
        if let Some(remediation) = &vuln.remediation_suggestion {
            line(String::new());
            line("REMEDIATION:".to_string());
            for text in remediation.lines() {
                line(format!("  {}", text));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FailureReason, ScanOptions, ScanRequest, ScanType, Vulnerability};
    use chrono::Utc;
    use url::Url;
    use uuid::Uuid;

    fn scan() -> Scan {
        Scan::new(ScanRequest {
            target_url: Url::parse("http://example.test/").unwrap(),
            scan_type: ScanType::Quick,
            options: ScanOptions::default(),
            custom_payloads: Vec::new(),
        })
    }

    #[test]
    fn clean_scan_renders_no_findings_banner() {
        let mut scan = scan();
        scan.start().unwrap();
        scan.complete().unwrap();
        let rendered = render(&scan);
        assert!(rendered.contains("No vulnerabilities detected"));
        assert!(rendered.contains("Surfaces probed: 0"));
    }

    #[test]
    fn findings_render_with_severity_counts() {
        let mut scan = scan();
        scan.start().unwrap();
        let id = scan.id;
        scan.push_vulnerability(Vulnerability {
            id: Uuid::new_v4(),
            scan_id: id,
            vulnerability_type: "Reflected XSS - HTML Body".to_string(),
            severity: Severity::Medium,
            endpoint: "http://example.test/search".to_string(),
            parameter: "q".to_string(),
            payload: "<script>alert(1)</script>".to_string(),
            evidence: "<script>alert(1)</script>".to_string(),
            ai_summary: Some("reflected into page body".to_string()),
            remediation_suggestion: None,
            created_at: Utc::now(),
        })
        .unwrap();
        scan.complete().unwrap();

        let rendered = render(&scan);
        assert!(rendered.contains("MEDIUM: 1"));
        assert!(rendered.contains("Parameter: q"));
        assert!(rendered.contains("reflected into page body"));
    }

    #[test]
    fn cancelled_scan_renders_its_reason() {
        let mut scan = scan();
        scan.start().unwrap();
        scan.fail(FailureReason::Cancelled).unwrap();
        let rendered = render(&scan);
        assert!(rendered.contains("SCAN DID NOT COMPLETE"));
        assert!(rendered.contains("Reason: cancelled"));
    }

    #[test]
    fn long_evidence_is_truncated() {
        let truncated = truncate_display(&"x".repeat(500), EVIDENCE_PREVIEW);
        assert!(truncated.len() <= EVIDENCE_PREVIEW + 3);
        assert!(truncated.ends_with("..."));
    }
}
