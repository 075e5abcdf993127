use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::RestackError;
use crate::models::{CveResult, Finding, FingerprintOutcome, Report};

/// Merged per-session artifact written next to the per-tool ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullScanArtifact {
    pub findings: Vec<Finding>,
    pub fingerprint: Option<FingerprintOutcome>,
    pub cve_matches: Option<CveResult>,
    pub scan_duration_seconds: f64,
}

impl From<&Report> for FullScanArtifact {
    fn from(report: &Report) -> Self {
        Self {
            findings: report.findings.clone(),
            fingerprint: report.fingerprint.clone(),
            cve_matches: report.cve_matches.clone(),
            scan_duration_seconds: report.scan_duration_seconds,
        }
    }
}

pub async fn write_full_scan(path: &Path, report: &Report) -> Result<(), RestackError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(&FullScanArtifact::from(report))?;
    tokio::fs::write(path, body).await?;
    info!(session_id = %report.session_id, path = %path.display(), "Wrote full-scan artifact");
    Ok(())
}

pub async fn read_full_scan(path: &Path) -> Result<FullScanArtifact, RestackError> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}
