//! One adapter per external tool, all behind [`ScannerAdapter`].

pub mod crawl;
pub mod cve_lookup;
pub mod fingerprint;
pub mod subprocess;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::RestackError;
use crate::models::{SessionId, ToolKind};

pub use crawl::{CrawlScanAdapter, HttpZapConnector, ZapApi, ZapConnector};
pub use cve_lookup::CveLookupAdapter;
pub use fingerprint::FingerprintAdapter;
pub use subprocess::SubprocessScanAdapter;

/// The per-session facts every adapter builds its config from.
#[derive(Debug, Clone)]
pub struct ScanTarget {
    pub session_id: SessionId,
    pub url: String,
    /// Where this tool's raw artifact for this session lives.
    pub artifact: PathBuf,
}

/// Tool-native output, held only between a run and normalization.
#[derive(Debug, Clone)]
pub struct RawToolReport {
    pub tool: ToolKind,
    pub session_id: SessionId,
    pub artifact: PathBuf,
    pub body: serde_json::Value,
}

#[async_trait]
pub trait ScannerAdapter: Send + Sync {
    /// Validated, fully-defaulted configuration for one run.
    type Config: Send + Sync;
    /// What the caller may supply on top of the defaults.
    type Overrides: Send + Sync;

    fn kind(&self) -> ToolKind;

    /// Merge `overrides` onto defaults. Fails closed when a required field
    /// is still missing.
    fn build_config(&self, target: &ScanTarget, overrides: &Self::Overrides) -> Result<Self::Config, RestackError>;

    /// Run the tool to completion and return its raw report.
    async fn run(&self, config: &Self::Config, cancel: &CancellationToken) -> Result<RawToolReport, RestackError>;

    /// Read a previously produced artifact back into memory.
    async fn parse(&self, artifact: &Path, session_id: &SessionId) -> Result<RawToolReport, RestackError> {
        read_artifact(self.kind(), artifact, session_id).await
    }
}

/// Read and decode a JSON artifact. A missing or unreadable file is a tool
/// execution failure; an empty file decodes to `null`.
pub async fn read_artifact(tool: ToolKind, artifact: &Path, session_id: &SessionId) -> Result<RawToolReport, RestackError> {
    let content = tokio::fs::read_to_string(artifact).await.map_err(|e| {
        RestackError::ToolExecution(format!("{} artifact {} unreadable: {}", tool, artifact.display(), e))
    })?;

    let body = if content.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&content).map_err(|e| {
            RestackError::ToolExecution(format!("{} artifact {} is not valid JSON: {}", tool, artifact.display(), e))
        })?
    };

    Ok(RawToolReport {
        tool,
        session_id: session_id.clone(),
        artifact: artifact.to_path_buf(),
        body,
    })
}

/// Target URLs must be absolute http(s).
pub fn validate_url(url: &str) -> Result<reqwest::Url, RestackError> {
    let parsed = reqwest::Url::parse(url.trim())
        .map_err(|e| RestackError::InvalidTarget(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        _ => Err(RestackError::InvalidTarget(format!("{}: only http(s) URLs with a host are scannable", url))),
    }
}

pub(crate) async fn ensure_parent(path: &Path) -> Result<(), RestackError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// `<dir>/<file name>` as seen from inside a container mount.
pub(crate) fn file_name(path: &Path) -> Result<String, RestackError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| RestackError::Config(format!("Artifact path {} has no file name", path.display())))
}
