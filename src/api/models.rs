use serde::{Deserialize, Serialize};

use crate::models::{ReportSummary, ScanRequest, SessionStatus, ToolKind, ToolOverrides};

#[derive(Debug, Deserialize)]
pub struct CreateScanRequest {
    pub url: String,
    /// Every tool when omitted.
    pub tools: Option<Vec<ToolKind>>,
    #[serde(default)]
    pub overrides: ToolOverrides,
}

impl From<CreateScanRequest> for ScanRequest {
    fn from(req: CreateScanRequest) -> Self {
        ScanRequest {
            url: req.url,
            tools: req.tools.unwrap_or_else(|| ToolKind::ALL.to_vec()),
            overrides: req.overrides,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanAccepted {
    pub session_id: String,
    pub status: SessionStatus,
    pub target: String,
    pub tools: Vec<ToolKind>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatus {
    pub session_id: String,
    pub status: SessionStatus,
}

#[derive(Debug, Serialize)]
pub struct ReportList {
    pub reports: Vec<ReportSummary>,
    pub total: usize,
}

impl From<Vec<ReportSummary>> for ReportList {
    fn from(reports: Vec<ReportSummary>) -> Self {
        Self { total: reports.len(), reports }
    }
}

/// `?start=&end=`, each an RFC 3339 timestamp or a `YYYY-MM-DD` date.
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: String,
    pub end: String,
}

/// Period parameters; anything omitted means "current".
#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    /// Last day of the week window.
    pub date: Option<chrono::NaiveDate>,
    pub year: Option<i32>,
    pub month: Option<u32>,
}
