use serde::Serialize;

use crate::model::{Coverage, Scan, Severity, Vulnerability};

#[derive(Serialize)]
struct Report<'a> {
    scan_metadata: ScanMetadata,
    summary: Summary,
    coverage: Coverage,
    findings: &'a [Vulnerability],
}

#[derive(Serialize)]
struct ScanMetadata {
    tool: String,
    version: String,
    scan_id: String,
    target: String,
    scan_type: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
    scan_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct Summary {
    total_findings: usize,
    critical: usize,
    high: usize,
    medium: usize,
    low: usize,
}

pub fn render(scan: &Scan) -> anyhow::Result<String> {
    let report = Report {
        scan_metadata: ScanMetadata {
            tool: "xspect".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            scan_id: scan.id.to_string(),
            target: scan.target_url.to_string(),
            scan_type: format!("{:?}", scan.scan_type).to_lowercase(),
            status: format!("{:?}", scan.status).to_lowercase(),
            failure_reason: scan.failure_reason.as_ref().map(|r| r.to_string()),
            scan_date: scan.created_at.to_rfc3339(),
            duration_secs: scan.duration_secs(),
        },
        summary: Summary {
            total_findings: scan.vulnerabilities.len(),
            critical: scan.count_by_severity(Severity::Critical),
            high: scan.count_by_severity(Severity::High),
            medium: scan.count_by_severity(Severity::Medium),
            low: scan.count_by_severity(Severity::Low),
        },
        coverage: scan.coverage,
        findings: &scan.vulnerabilities,
    };

    let json = serde_json::to_string_pretty(&report)?;
    Ok(json)
}
