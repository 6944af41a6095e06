use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use url::Url;

use crate::model::{ScanOptions, ScanRequest, ScanType};
use crate::orchestrator::EngineConfig;
use crate::report::ReportFormat;

/// xspect – context-aware reflected XSS scanner
#[derive(Parser, Debug)]
#[command(
    name = "xspect",
    version,
    about = "xspect – context-aware reflected XSS scanner",
    long_about = r#"
xspect crawls a target origin, injects payloads into every discovered
URL parameter and form field, and classifies literal reflections by the
HTML context they land in:

  • Script block        -> CRITICAL
  • Event handler       -> CRITICAL
  • Attribute breakout  -> HIGH
  • HTML body           -> MEDIUM
  • URL attribute       -> LOW

Entity-encoded reflections are never reported. The crawl stays on the
target's origin (scheme + host + port) and every scan reports how much
of the target was actually probed."#,
    after_help = r#"EXAMPLES:

  xspect http://testsite.local/
  xspect http://testsite.local/ --scan-type quick --depth 1
  xspect http://testsite.local/ --payloads extra.txt --format json -o report.json
  xspect http://testsite.local/ --skip-forms --rate 10 --annotate"#
)]
pub struct Cli {
    /// Target URL; the scan never leaves this origin
    pub target: String,

    /// Payload selection: quick (basic tier), comprehensive (all tiers),
    /// custom (all tiers plus --payloads)
    #[arg(long = "scan-type", value_enum, default_value = "comprehensive", help_heading = "SCAN OPTIONS")]
    pub scan_type: ScanTypeArg,

    /// Maximum crawl depth; 0 scans the target page only
    #[arg(long, default_value_t = 2, help_heading = "SCAN OPTIONS")]
    pub depth: usize,

    /// Do not inject into form fields
    #[arg(long = "skip-forms", help_heading = "SCAN OPTIONS")]
    pub skip_forms: bool,

    /// Do not inject into URL query parameters
    #[arg(long = "skip-urls", help_heading = "SCAN OPTIONS")]
    pub skip_urls: bool,

    /// File of extra payloads, one per line; implies --scan-type custom
    #[arg(long, value_name = "FILE", help_heading = "SCAN OPTIONS")]
    pub payloads: Option<PathBuf>,

    /// In-flight probe requests
    #[arg(long, default_value_t = 8, help_heading = "HTTP OPTIONS")]
    pub concurrency: usize,

    /// In-flight crawl requests per depth layer
    #[arg(long = "crawl-workers", default_value_t = 4, help_heading = "HTTP OPTIONS")]
    pub crawl_workers: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10, help_heading = "HTTP OPTIONS")]
    pub timeout: u64,

    /// Max requests per second; 0 = unlimited
    #[arg(long, default_value_t = 0, help_heading = "HTTP OPTIONS")]
    pub rate: u32,

    /// Report format
    #[arg(long, value_enum, default_value = "text", help_heading = "OUTPUT")]
    pub format: FormatArg,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE", help_heading = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Annotate findings with triage summaries and remediation advice
    #[arg(long, help_heading = "OUTPUT")]
    pub annotate: bool,

    /// Suppress the startup banner
    #[arg(long = "no-banner", help_heading = "OUTPUT")]
    pub no_banner: bool,

    /// Verbose logging (debug level)
    #[arg(short, long, conflicts_with = "quiet", help_heading = "OUTPUT")]
    pub verbose: bool,

    /// Quiet logging (warnings only)
    #[arg(short, long, help_heading = "OUTPUT")]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScanTypeArg {
    Quick,
    Comprehensive,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Text,
    Json,
}

impl Cli {
    pub fn scan_request(&self) -> Result<ScanRequest> {
        let target_url = Url::parse(&self.target)
            .with_context(|| format!("invalid target URL: {}", self.target))?;

        let custom_payloads = match &self.payloads {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read payload file {}", path.display()))?;
                raw.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(String::from)
                    .collect()
            }
            None => Vec::new(),
        };

        // A payload file always means custom selection.
        let scan_type = if !custom_payloads.is_empty() {
            ScanType::Custom
        } else {
            match self.scan_type {
                ScanTypeArg::Quick => ScanType::Quick,
                ScanTypeArg::Comprehensive => ScanType::Comprehensive,
                ScanTypeArg::Custom => ScanType::Custom,
            }
        };

        Ok(ScanRequest {
            target_url,
            scan_type,
            options: ScanOptions {
                include_forms: !self.skip_forms,
                include_urls: !self.skip_urls,
                max_depth: self.depth,
            },
            custom_payloads,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            timeout: Duration::from_secs(self.timeout.max(1)),
            rate: self.rate,
            concurrency: self.concurrency.max(1),
            crawl_workers: self.crawl_workers.max(1),
            ..EngineConfig::default()
        }
    }

    pub fn report_format(&self) -> ReportFormat {
        match self.format {
            FormatArg::Text => ReportFormat::Text,
            FormatArg::Json => ReportFormat::Json,
        }
    }
}
