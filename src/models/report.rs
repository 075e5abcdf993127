use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::cve::CveResult;
use super::finding::Finding;
use super::fingerprint::FingerprintOutcome;
use super::rule::RuleDefinition;
use super::session::{SessionId, SessionStatus};
use super::tool::ToolKind;
use crate::errors::RestackError;

/// Structured record of one adapter's failure inside an otherwise completed scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolErrorMarker {
    pub tool: ToolKind,
    pub error_type: String,
    pub message: String,
}

impl ToolErrorMarker {
    pub fn from_error(tool: ToolKind, err: &RestackError) -> Self {
        Self {
            tool,
            error_type: err.marker_type().to_string(),
            message: err.to_string(),
        }
    }
}

/// Aggregate result of one scan session. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub session_id: SessionId,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub scanners: Vec<String>,
    pub total_findings: usize,
    pub critical_count: usize,
    pub fingerprint: Option<FingerprintOutcome>,
    pub cve_matches: Option<CveResult>,
    #[serde(default)]
    pub tool_errors: Vec<ToolErrorMarker>,
    /// Deduplicated rules, grouped by the scanner that defined them.
    #[serde(default)]
    pub rules: BTreeMap<ToolKind, Vec<RuleDefinition>>,
    #[serde(default)]
    pub findings: Vec<Finding>,
    pub scan_duration_seconds: f64,
}

impl Report {
    pub fn error_for(&self, tool: ToolKind) -> Option<&ToolErrorMarker> {
        self.tool_errors.iter().find(|m| m.tool == tool)
    }
}

/// Lightweight listing row for date-range queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub session_id: SessionId,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub total_findings: usize,
    pub critical_count: usize,
    pub scan_duration_seconds: f64,
}

impl From<&Report> for ReportSummary {
    fn from(r: &Report) -> Self {
        Self {
            session_id: r.session_id.clone(),
            target: r.target.clone(),
            started_at: r.started_at,
            status: r.status,
            total_findings: r.total_findings,
            critical_count: r.critical_count,
            scan_duration_seconds: r.scan_duration_seconds,
        }
    }
}
