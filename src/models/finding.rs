use serde::{Deserialize, Serialize};

use super::session::SessionId;
use super::tool::ToolKind;

/// Canonical severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// High and Critical both count towards a report's critical count.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full request/response pair recovered from the scanner's message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpTransaction {
    pub id: String,
    #[serde(default)]
    pub request_header: String,
    #[serde(default)]
    pub request_body: String,
    #[serde(default)]
    pub response_header: String,
    #[serde(default)]
    pub response_body: String,
}

/// A normalized vulnerability record, independent of the tool that found it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: String,
    pub session_id: SessionId,
    pub scanner: ToolKind,
    pub rule_id: String,
    pub severity: Severity,
    pub confidence: Option<String>,
    /// Path component of the affected URL.
    pub endpoint: String,
    pub http_method: Option<String>,
    pub parameters: Option<String>,
    pub message: Option<String>,
    /// The tool-native fragment this finding was built from.
    pub evidence: serde_json::Value,
    pub transaction: Option<HttpTransaction>,
}
