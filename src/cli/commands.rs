use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::models::{ToolKind, ZapScanMode};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("RESTACK_GIT_HASH"),
    ", built ",
    env!("RESTACK_BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(name = "restack", version, long_version = LONG_VERSION, about = "Web vulnerability scan orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// YAML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a target once and store the report
    Scan(ScanArgs),
    /// Start the HTTP API together with the scheduler
    Serve(ServeArgs),
    /// Run only the scheduler
    Schedule(ScheduleArgs),
    /// Print a stored report as JSON
    Report(ReportArgs),
    /// Export a stored report as SARIF
    Export(ExportArgs),
    /// Re-normalize a tool artifact without scanning again
    Replay(ReplayArgs),
    /// Refresh the search_vulns vulnerability database
    UpdateVulndb,
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone)]
pub struct ScanArgs {
    /// Target URL (http or https)
    #[arg(short, long)]
    pub url: String,

    /// Comma-separated tools: whatweb, search_vulns, zap, wapiti (default: all)
    #[arg(short, long, value_delimiter = ',')]
    pub tools: Vec<ToolKind>,

    /// Use a running ZAP instead of starting a container
    #[arg(long)]
    pub zap_api_url: Option<String>,

    /// API key for --zap-api-url
    #[arg(long, requires = "zap_api_url")]
    pub zap_api_key: Option<String>,

    /// ZAP scan mode: passive or active
    #[arg(long, value_parser = parse_scan_mode)]
    pub zap_mode: Option<ZapScanMode>,

    /// Skip ZAP's client spider pass
    #[arg(long)]
    pub no_deep_crawl: bool,

    /// Wapiti module selection
    #[arg(long)]
    pub wapiti_modules: Option<String>,

    /// Wapiti aggression: paranoid, sneaky, polite, normal, aggressive, insane
    #[arg(long)]
    pub wapiti_aggression: Option<String>,

    /// Also write the report JSON to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

fn parse_scan_mode(raw: &str) -> Result<ZapScanMode, String> {
    match raw.to_ascii_lowercase().as_str() {
        "passive" => Ok(ZapScanMode::Passive),
        "active" => Ok(ZapScanMode::Active),
        other => Err(format!("unknown scan mode '{}', expected passive or active", other)),
    }
}

#[derive(Args, Clone)]
pub struct ServeArgs {
    /// Bind address
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port
    #[arg(short, long, default_value = "8000")]
    pub port: u16,

    /// Do not run scheduled jobs in this process
    #[arg(long)]
    pub no_scheduler: bool,
}

#[derive(Args, Clone)]
pub struct ScheduleArgs {
    /// List the stored jobs and their next fire time, then exit
    #[arg(long)]
    pub list: bool,
}

#[derive(Args, Clone)]
pub struct ReportArgs {
    /// Session id
    pub id: String,
}

#[derive(Args, Clone)]
pub struct ExportArgs {
    /// Session id
    pub id: String,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Clone)]
pub struct ReplayArgs {
    /// Tool that produced the artifact
    #[arg(short, long)]
    pub tool: ToolKind,

    /// Raw artifact written by an earlier scan
    pub artifact: PathBuf,

    /// Session id to attribute findings to (default: the artifact's file stem)
    #[arg(long)]
    pub session: Option<String>,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Path to YAML configuration file
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_tools_are_comma_separated() {
        let cli = Cli::try_parse_from(["restack", "scan", "-u", "http://example.test", "--tools", "zap,cve"]).unwrap();
        match cli.command {
            Commands::Scan(args) => assert_eq!(args.tools, vec![ToolKind::Zap, ToolKind::SearchVulns]),
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["restack", "report", "abc", "-vv", "--log-json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.log_json);
    }

    #[test]
    fn test_api_key_requires_api_url() {
        assert!(Cli::try_parse_from(["restack", "scan", "-u", "http://x.test", "--zap-api-key", "k"]).is_err());
    }

    #[test]
    fn test_update_vulndb_takes_no_arguments() {
        let cli = Cli::try_parse_from(["restack", "update-vulndb"]).unwrap();
        assert!(matches!(cli.command, Commands::UpdateVulndb));
        assert!(Cli::try_parse_from(["restack", "update-vulndb", "extra"]).is_err());
    }

    #[test]
    fn test_unknown_tool_rejected() {
        assert!(Cli::try_parse_from(["restack", "scan", "-u", "http://x.test", "--tools", "nikto"]).is_err());
    }
}
