use serde::{Deserialize, Serialize};

use super::tool::ToolKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZapScanMode {
    /// Only wait for the passive scanner to drain.
    Passive,
    #[default]
    Active,
}

/// Caller-supplied Wapiti knobs; unset fields fall back to config defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WapitiOverrides {
    pub modules: Option<String>,
    pub aggression: Option<String>,
    pub max_scan_time_secs: Option<u64>,
    pub tasks: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZapOverrides {
    /// Use an already running ZAP instead of starting a container.
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub scan_mode: Option<ZapScanMode>,
    pub deep_crawl: Option<bool>,
    pub ajax_max_depth: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolOverrides {
    pub wapiti: WapitiOverrides,
    pub zap: ZapOverrides,
}

fn all_tools() -> Vec<ToolKind> {
    ToolKind::ALL.to_vec()
}

/// Tool selection and overrides stored with a scheduled job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOptions {
    #[serde(default = "all_tools")]
    pub tools: Vec<ToolKind>,
    #[serde(default)]
    pub overrides: ToolOverrides,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self { tools: all_tools(), overrides: ToolOverrides::default() }
    }
}

/// A request to scan one target with a set of tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub url: String,
    pub tools: Vec<ToolKind>,
    #[serde(default)]
    pub overrides: ToolOverrides,
}

impl ScanRequest {
    pub fn new(url: impl Into<String>, tools: Vec<ToolKind>) -> Self {
        Self { url: url.into(), tools, overrides: ToolOverrides::default() }
    }

    pub fn from_options(url: impl Into<String>, options: &ScanOptions) -> Self {
        Self {
            url: url.into(),
            tools: options.tools.clone(),
            overrides: options.overrides.clone(),
        }
    }
}
