use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::fingerprint::json_kind;
use super::{ensure_parent, file_name, read_artifact, RawToolReport, ScanTarget, ScannerAdapter};
use crate::container::{ContainerHandle, ContainerRuntime, ContainerSpec, VolumeMount};
use crate::errors::RestackError;
use crate::models::{CveEntry, CveResult, FingerprintResult, SessionId, ToolKind};

const REPORTS_MOUNT: &str = "/home/search_vulns/reports";
const WORKDIR: &str = "/home/search_vulns";
/// Long-lived lookup service shared by every session.
pub const SERVICE_NAME: &str = "restack-search-vulns";

#[derive(Debug, Clone, PartialEq)]
pub struct CveLookupConfig {
    pub session_id: SessionId,
    /// One `"<technology> <version>"` query per versioned technology.
    pub queries: Vec<String>,
    pub image: String,
    pub container_name: String,
    pub reports_dir: PathBuf,
    pub output: PathBuf,
}

impl CveLookupConfig {
    /// The idle service container that queries are executed in.
    pub fn spec(&self) -> ContainerSpec {
        service_spec(&self.image, &self.container_name, &self.reports_dir)
    }

    pub fn query_cmd(&self) -> Result<Vec<String>, RestackError> {
        let mut cmd = vec![
            "./search_vulns.py".to_string(),
            "--include-single-version-vulns".into(),
            "-f".into(),
            "json".into(),
            "-o".into(),
            format!("{}/{}", REPORTS_MOUNT, file_name(&self.output)?),
        ];
        for q in &self.queries {
            cmd.push("-q".into());
            cmd.push(q.clone());
        }
        Ok(cmd)
    }
}

fn service_spec(image: &str, name: &str, reports_dir: &Path) -> ContainerSpec {
    ContainerSpec {
        image: image.to_string(),
        name: name.to_string(),
        entrypoint: Some(vec!["sleep".into(), "infinity".into()]),
        working_dir: Some(WORKDIR.into()),
        volumes: vec![VolumeMount { host: reports_dir.to_path_buf(), container: REPORTS_MOUNT.into() }],
        ..Default::default()
    }
}

/// Correlates fingerprinted `technology version` pairs with known CVEs.
pub struct CveLookupAdapter {
    runtime: Arc<dyn ContainerRuntime>,
    image: String,
}

impl CveLookupAdapter {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, image: impl Into<String>) -> Self {
        Self { runtime, image: image.into() }
    }

    /// Start the lookup service, or attach to the one already running.
    async fn service(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RestackError> {
        for volume in &spec.volumes {
            tokio::fs::create_dir_all(&volume.host).await?;
        }
        let handle = self
            .runtime
            .start(spec)
            .await
            .map_err(|e| RestackError::ToolUnavailable(format!("search_vulns service failed to start: {}", e)))?;
        if handle.reused {
            debug!(container = %handle.name, "Using running search_vulns service");
        } else {
            info!(container = %handle.name, "search_vulns service started");
        }
        Ok(handle)
    }

    /// Run `cmd` in the service. Cancellation abandons the wait; the
    /// service itself stays up for other sessions.
    async fn exec(&self, handle: &ContainerHandle, cmd: &[String], cancel: &CancellationToken) -> Result<i64, RestackError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(RestackError::Cancelled("search_vulns cancelled".into())),
            code = self.runtime.exec(handle, cmd, Some(WORKDIR)) => code,
        }
    }

    /// Refresh the service's vulnerability database (`search_vulns.py -u`).
    pub async fn update_database(&self, reports_dir: &Path, cancel: &CancellationToken) -> Result<(), RestackError> {
        if self.image.trim().is_empty() {
            return Err(RestackError::Config("containers.search_vulns_image is empty".into()));
        }
        let handle = self.service(&service_spec(&self.image, SERVICE_NAME, reports_dir)).await?;
        info!(container = %handle.name, "Updating the vulnerability database");
        let cmd = ["./search_vulns.py".to_string(), "-u".to_string()];
        match self.exec(&handle, &cmd, cancel).await? {
            0 => {
                info!(container = %handle.name, "Vulnerability database updated");
                Ok(())
            }
            code => Err(RestackError::ToolExecution(format!("search_vulns -u exited with {}", code))),
        }
    }

    /// Split a search_vulns document into found CVE lists and misses.
    ///
    /// Each key is a query; a string value means the product was not
    /// recognised, an object with `vulns` (map or list) or a bare list holds
    /// the matches.
    pub fn extract(raw: &RawToolReport) -> Result<CveResult, RestackError> {
        let queries = match &raw.body {
            Value::Object(map) => map,
            Value::Null => return Ok(CveResult::default()),
            other => {
                return Err(RestackError::Normalization(format!(
                    "search_vulns artifact must be an object, got {}",
                    json_kind(other)
                )))
            }
        };

        let mut result = CveResult::default();
        for (query, value) in queries {
            let entries: Vec<CveEntry> = match value {
                Value::String(_) | Value::Null => Vec::new(),
                Value::Array(items) => items.iter().filter_map(|v| cve_entry(None, v)).collect(),
                Value::Object(obj) => match obj.get("vulns") {
                    Some(Value::Object(vulns)) => vulns.iter().filter_map(|(id, v)| cve_entry(Some(id), v)).collect(),
                    Some(Value::Array(vulns)) => vulns.iter().filter_map(|v| cve_entry(None, v)).collect(),
                    _ => Vec::new(),
                },
                _ => Vec::new(),
            };

            if entries.is_empty() {
                result.not_found.push(query.clone());
            } else {
                result.found.insert(query.clone(), entries);
            }
        }
        Ok(result)
    }
}

fn cve_entry(key: Option<&String>, v: &Value) -> Option<CveEntry> {
    let id = v
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| key.cloned())?;

    let text = |field: &str| -> Option<String> {
        match v.get(field) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    };
    let list = |field: &str| -> Vec<String> {
        match v.get(field) {
            Some(Value::Array(items)) => items.iter().filter_map(|i| i.as_str().map(str::to_string)).collect(),
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    };

    Some(CveEntry {
        id,
        sources: list("match_sources"),
        description: text("description").unwrap_or_default(),
        published: text("published"),
        modified: text("modified"),
        cvss_version: text("cvss_ver"),
        cvss: text("cvss"),
        exploits: list("exploits"),
        aliases: list("aliases"),
    })
}

#[async_trait]
impl ScannerAdapter for CveLookupAdapter {
    type Config = CveLookupConfig;
    type Overrides = FingerprintResult;

    fn kind(&self) -> ToolKind {
        ToolKind::SearchVulns
    }

    fn build_config(&self, target: &ScanTarget, fingerprint: &FingerprintResult) -> Result<CveLookupConfig, RestackError> {
        if self.image.trim().is_empty() {
            return Err(RestackError::Config("containers.search_vulns_image is empty".into()));
        }
        let reports_dir = target
            .artifact
            .parent()
            .map(PathBuf::from)
            .ok_or_else(|| RestackError::Config("search_vulns artifact path has no parent directory".into()))?;

        let mut queries: Vec<String> = Vec::new();
        for tech in fingerprint.versioned() {
            if let Some(version) = &tech.version {
                let q = format!("{} {}", tech.name, version);
                if !queries.contains(&q) {
                    queries.push(q);
                }
            }
        }

        Ok(CveLookupConfig {
            session_id: target.session_id.clone(),
            queries,
            image: self.image.clone(),
            container_name: SERVICE_NAME.to_string(),
            reports_dir,
            output: target.artifact.clone(),
        })
    }

    async fn run(&self, config: &CveLookupConfig, cancel: &CancellationToken) -> Result<RawToolReport, RestackError> {
        if config.queries.is_empty() {
            debug!(session_id = %config.session_id, tool = "search_vulns", "No versioned technologies, nothing to look up");
            return Ok(RawToolReport {
                tool: ToolKind::SearchVulns,
                session_id: config.session_id.clone(),
                artifact: config.output.clone(),
                body: Value::Object(Default::default()),
            });
        }

        ensure_parent(&config.output).await?;
        info!(session_id = %config.session_id, tool = "search_vulns", queries = config.queries.len(), "Starting CVE lookup");

        let handle = self.service(&config.spec()).await?;
        let exit = self.exec(&handle, &config.query_cmd()?, cancel).await?;
        if exit != 0 {
            return Err(RestackError::ToolExecution(format!("search_vulns exited with {}", exit)));
        }
        read_artifact(ToolKind::SearchVulns, &config.output, &config.session_id).await
    }
}
