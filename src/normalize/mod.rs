//! Tool-native reports -> canonical rules and findings.

pub mod severity;
pub mod wapiti;
pub mod zap;

use serde::Serialize;

use crate::adapters::RawToolReport;
use crate::errors::RestackError;
use crate::models::{Finding, RuleDefinition, SessionId, ToolKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CanonicalReport {
    /// Unique by id within one report.
    pub rules: Vec<RuleDefinition>,
    pub findings: Vec<Finding>,
}

/// Convert one raw report. Fingerprint and CVE reports carry no findings
/// and normalize to an empty report.
pub fn to_canonical(raw: &RawToolReport, tool: ToolKind) -> Result<CanonicalReport, RestackError> {
    if raw.tool != tool {
        return Err(RestackError::Normalization(format!(
            "{} report handed to the {} normalizer",
            raw.tool, tool
        )));
    }
    match tool {
        ToolKind::Wapiti => wapiti::normalize(&raw.session_id, &raw.body),
        ToolKind::Zap => zap::normalize(&raw.session_id, &raw.body),
        ToolKind::WhatWeb | ToolKind::SearchVulns => Ok(CanonicalReport::default()),
    }
}

/// Findings at High or Critical. The only place this count is computed.
pub fn critical_count(findings: &[Finding]) -> usize {
    findings.iter().filter(|f| f.severity.is_critical()).count()
}

/// Deterministic per-report id so re-normalizing an artifact is stable.
pub(crate) fn finding_id(session_id: &SessionId, tool: ToolKind, n: usize) -> String {
    format!("{}-{}-{}", session_id, tool, n)
}

/// Path component of a URL; plain paths pass through.
pub(crate) fn endpoint_path(raw: &str) -> String {
    match reqwest::Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        Err(_) if raw.starts_with('/') => raw.split('?').next().unwrap_or(raw).to_string(),
        Err(_) => raw.to_string(),
    }
}
