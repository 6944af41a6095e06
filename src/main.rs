use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use xspect::cancel::CancelToken;
use xspect::cli::Cli;
use xspect::orchestrator::Engine;
use xspect::report::{self, ReportFormat};
use xspect::store::MemoryScanStore;
use xspect::triage::RuleBasedSummarizer;

const BANNER: &str = r#"
 ╔══════════════════════════════════════════════╗
 ║                                              ║
 ║   ██╗  ██╗███████╗██████╗ ███████╗ ██████╗   ║
 ║   ╚██╗██╔╝██╔════╝██╔══██╗██╔════╝██╔════╝   ║
 ║    ╚███╔╝ ███████╗██████╔╝█████╗  ██║        ║
 ║    ██╔██╗ ╚════██║██╔═══╝ ██╔══╝  ██║        ║
 ║   ██╔╝ ██╗███████║██║     ███████╗╚██████╗   ║
 ║   ╚═╝  ╚═╝╚══════╝╚═╝     ╚══════╝ ╚═════╝   ║
 ║                                              ║
 ║   Context-aware reflected XSS scanner        ║
 ║                                              ║
 ╚══════════════════════════════════════════════╝
"#;

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "xspect=debug"
    } else if quiet {
        "xspect=warn"
    } else {
        "xspect=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if !cli.no_banner && !cli.quiet {
        eprintln!("\x1b[36m{}\x1b[0m", BANNER);
    }

    let request = cli.scan_request()?;
    let store = Arc::new(MemoryScanStore::new());
    let mut engine = Engine::new(cli.engine_config(), store);
    if cli.annotate {
        engine = engine.with_summarizer(Arc::new(RuleBasedSummarizer::new()));
    }

    let cancel = CancelToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling scan");
            signal_token.cancel();
        }
    });

    let scan = engine.run(request, cancel).await?;

    let rendered = match cli.report_format() {
        ReportFormat::Text => report::text::render(&scan),
        ReportFormat::Json => report::json::render(&scan)?,
    };
    match &cli.output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("cannot write report to {}", path.display()))?;
        }
        None => println!("{}", rendered),
    }

    // Findings or an incomplete scan flip the exit code for CI use.
    if !scan.vulnerabilities.is_empty() || scan.failure_reason.is_some() {
        std::process::exit(1);
    }
    Ok(())
}
