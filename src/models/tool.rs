use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::RestackError;

/// The external tools the orchestrator knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ToolKind {
    /// Fingerprinting (WhatWeb), containerized.
    #[serde(rename = "whatweb")]
    WhatWeb,
    /// CVE correlation (search_vulns), containerized.
    #[serde(rename = "search_vulns")]
    SearchVulns,
    /// Crawl-then-scan REST scanner (OWASP ZAP).
    #[serde(rename = "zap")]
    Zap,
    /// Form/injection scanner (Wapiti), subprocess.
    #[serde(rename = "wapiti")]
    Wapiti,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [ToolKind::WhatWeb, ToolKind::SearchVulns, ToolKind::Zap, ToolKind::Wapiti];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WhatWeb => "whatweb",
            Self::SearchVulns => "search_vulns",
            Self::Zap => "zap",
            Self::Wapiti => "wapiti",
        }
    }

    /// Name used as the SARIF driver name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::WhatWeb => "WhatWeb",
            Self::SearchVulns => "search_vulns",
            Self::Zap => "OWASP ZAP",
            Self::Wapiti => "Wapiti3",
        }
    }

    /// Tools whose raw reports carry vulnerability findings.
    pub fn produces_findings(&self) -> bool {
        matches!(self, Self::Zap | Self::Wapiti)
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = RestackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whatweb" | "fingerprint" => Ok(Self::WhatWeb),
            "search_vulns" | "searchvulns" | "cve" => Ok(Self::SearchVulns),
            "zap" => Ok(Self::Zap),
            "wapiti" => Ok(Self::Wapiti),
            other => Err(RestackError::Config(format!("Unknown tool: {}", other))),
        }
    }
}
