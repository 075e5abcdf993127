use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{ensure_parent, read_artifact, validate_url, RawToolReport, ScanTarget, ScannerAdapter};
use crate::config::WapitiDefaults;
use crate::errors::RestackError;
use crate::models::{SessionId, ToolKind, WapitiOverrides};

const AGGRESSION_LEVELS: &[&str] = &["paranoid", "sneaky", "polite", "normal", "aggressive", "insane"];

#[derive(Debug, Clone, PartialEq)]
pub struct WapitiConfig {
    pub session_id: SessionId,
    pub binary: String,
    pub url: String,
    pub modules: String,
    pub aggression: String,
    pub max_scan_time_secs: u64,
    pub tasks: u32,
    pub output: PathBuf,
}

impl WapitiConfig {
    pub fn args(&self) -> Vec<String> {
        vec![
            "-v".into(), "0".into(),
            "-f".into(), "json".into(),
            "-l".into(), "2".into(),
            "--flush-session".into(),
            "--headless".into(), "hidden".into(),
            "-u".into(), self.url.clone(),
            "-m".into(), self.modules.clone(),
            "-o".into(), self.output.display().to_string(),
            "-S".into(), self.aggression.clone(),
            "--max-scan-time".into(), self.max_scan_time_secs.to_string(),
            "--tasks".into(), self.tasks.to_string(),
        ]
    }
}

/// Drives the Wapiti CLI: one process per session, results read from the
/// JSON artifact only.
pub struct SubprocessScanAdapter {
    defaults: WapitiDefaults,
}

impl SubprocessScanAdapter {
    pub fn new(defaults: WapitiDefaults) -> Self {
        Self { defaults }
    }
}

#[async_trait]
impl ScannerAdapter for SubprocessScanAdapter {
    type Config = WapitiConfig;
    type Overrides = WapitiOverrides;

    fn kind(&self) -> ToolKind {
        ToolKind::Wapiti
    }

    fn build_config(&self, target: &ScanTarget, overrides: &WapitiOverrides) -> Result<WapitiConfig, RestackError> {
        let url = validate_url(&target.url)?.to_string();

        let modules = overrides.modules.clone().unwrap_or_else(|| self.defaults.modules.clone());
        if modules.trim().is_empty() {
            return Err(RestackError::Config("wapiti modules must not be empty".into()));
        }

        let aggression = overrides
            .aggression
            .clone()
            .unwrap_or_else(|| self.defaults.aggression.clone())
            .to_lowercase();
        if !AGGRESSION_LEVELS.contains(&aggression.as_str()) {
            return Err(RestackError::Config(format!("Unknown wapiti aggression level: {}", aggression)));
        }

        let max_scan_time_secs = overrides.max_scan_time_secs.unwrap_or(self.defaults.max_scan_time_secs);
        let tasks = overrides.tasks.unwrap_or(self.defaults.tasks);
        if max_scan_time_secs == 0 || tasks == 0 {
            return Err(RestackError::Config("wapiti max scan time and tasks must be non-zero".into()));
        }

        Ok(WapitiConfig {
            session_id: target.session_id.clone(),
            binary: self.defaults.binary.clone(),
            url,
            modules,
            aggression,
            max_scan_time_secs,
            tasks,
            output: target.artifact.clone(),
        })
    }

    async fn run(&self, config: &WapitiConfig, cancel: &CancellationToken) -> Result<RawToolReport, RestackError> {
        ensure_parent(&config.output).await?;
        let args = config.args();
        info!(session_id = %config.session_id, tool = "wapiti", url = %config.url, "Launching scanner process");
        debug!(binary = %config.binary, args = ?args, "Wapiti command line");

        let mut child = Command::new(&config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RestackError::ToolExecution(format!("Failed to launch {}: {}", config.binary, e)))?;

        let stderr_reader = child.stderr.take().map(|mut err| {
            tokio::spawn(async move {
                let mut buf = String::new();
                err.read_to_string(&mut buf).await.ok();
                buf
            })
        });
        let status = tokio::select! {
            _ = cancel.cancelled() => {
                child.kill().await.ok();
                return Err(RestackError::Cancelled("wapiti scan cancelled".into()));
            }
            status = child.wait() => status?,
        };

        if !status.success() {
            let tail = match stderr_reader {
                Some(task) => task.await.unwrap_or_default(),
                None => String::new(),
            };
            let tail: String = tail.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            return Err(RestackError::ToolExecution(format!(
                "wapiti exited with {}: {}",
                status.code().map_or("signal".to_string(), |c| c.to_string()),
                tail
            )));
        }

        info!(session_id = %config.session_id, tool = "wapiti", "Scanner process finished");
        self.parse(&config.output, &config.session_id).await
    }

    async fn parse(&self, artifact: &Path, session_id: &SessionId) -> Result<RawToolReport, RestackError> {
        let raw = read_artifact(ToolKind::Wapiti, artifact, session_id).await?;
        if !raw.body.is_object() {
            return Err(RestackError::ToolExecution(format!(
                "wapiti artifact {} is not a JSON object",
                artifact.display()
            )));
        }
        Ok(raw)
    }
}
