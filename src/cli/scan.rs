use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::commands::ScanArgs;
use super::{cancel_on_ctrl_c, Context};
use crate::errors::RestackError;
use crate::models::{Report, ScanRequest, ToolKind, ToolOverrides};
use crate::pipeline::ScanExecutor;

pub fn request_from_args(args: &ScanArgs) -> ScanRequest {
    let tools = if args.tools.is_empty() { ToolKind::ALL.to_vec() } else { args.tools.clone() };
    let mut overrides = ToolOverrides::default();
    overrides.zap.api_url = args.zap_api_url.clone();
    overrides.zap.api_key = args.zap_api_key.clone();
    overrides.zap.scan_mode = args.zap_mode;
    if args.no_deep_crawl {
        overrides.zap.deep_crawl = Some(false);
    }
    overrides.wapiti.modules = args.wapiti_modules.clone();
    overrides.wapiti.aggression = args.wapiti_aggression.clone();
    ScanRequest { url: args.url.clone(), tools, overrides }
}

pub async fn handle_scan(args: ScanArgs, config_path: Option<&Path>) -> Result<(), RestackError> {
    let ctx = Context::load(config_path).await?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let orchestrator = ctx.orchestrator(cancel)?;
    let report = orchestrator.execute(request_from_args(&args)).await?;

    if let Some(out) = &args.output {
        tokio::fs::write(out, serde_json::to_string_pretty(&report)?).await?;
        info!(path = %out.display(), "Report written");
    }
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &Report) {
    println!("Session:   {}", report.session_id);
    println!("Target:    {}", report.target);
    println!("Status:    {}", report.status.as_str());
    println!("Scanners:  {}", report.scanners.join(", "));
    println!("Findings:  {} ({} high or critical)", report.total_findings, report.critical_count);
    if let Some(fp) = report.fingerprint.as_ref().and_then(|f| f.result()) {
        let techs: Vec<String> = fp
            .technologies
            .iter()
            .map(|t| match &t.version {
                Some(v) => format!("{} {}", t.name, v),
                None => t.name.clone(),
            })
            .collect();
        println!("Tech:      {}", techs.join(", "));
    }
    if let Some(cves) = &report.cve_matches {
        println!("CVEs:      {} across {} technologies", cves.total_cves(), cves.found.len());
    }
    for marker in &report.tool_errors {
        println!("  ! {} {}: {}", marker.tool, marker.error_type, marker.message);
    }
    println!("Duration:  {:.1}s", report.scan_duration_seconds);
}
