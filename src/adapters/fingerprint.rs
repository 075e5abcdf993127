use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{ensure_parent, file_name, read_artifact, validate_url, RawToolReport, ScanTarget, ScannerAdapter};
use crate::container::{ContainerLease, ContainerRuntime, ContainerSpec, VolumeMount};
use crate::errors::RestackError;
use crate::models::{FingerprintOutcome, FingerprintResult, SessionId, Technology, ToolKind};

const REPORTS_MOUNT: &str = "/src/whatweb/reports";
const WORKDIR: &str = "/src/whatweb";

/// Plugins whose output is noise for technology detection.
const IGNORED_PLUGINS: &[&str] = &["UncommonHeaders", "Open-Graph-Protocol", "Title", "Frame", "Script"];
/// Plugins carrying network/location metadata rather than technologies.
const METADATA_PLUGINS: &[&str] = &["Email", "IP", "Country", "HTTPServer"];

static GENERATOR_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?P<name>.+?)\s+v?(?P<version>\d[\w.\-]*)$").ok());

#[derive(Debug, Clone, PartialEq)]
pub struct WhatWebConfig {
    pub session_id: SessionId,
    pub url: String,
    pub image: String,
    pub container_name: String,
    pub reports_dir: PathBuf,
    pub output: PathBuf,
}

impl WhatWebConfig {
    pub fn spec(&self) -> Result<ContainerSpec, RestackError> {
        Ok(ContainerSpec {
            image: self.image.clone(),
            name: self.container_name.clone(),
            cmd: vec![
                "./whatweb".into(),
                "--verbose".into(),
                format!("--log-json=./reports/{}", file_name(&self.output)?),
                self.url.clone(),
            ],
            working_dir: Some(WORKDIR.into()),
            volumes: vec![VolumeMount { host: self.reports_dir.clone(), container: REPORTS_MOUNT.into() }],
            ..Default::default()
        })
    }
}

/// Passive fingerprinting in a throwaway WhatWeb container.
pub struct FingerprintAdapter {
    runtime: Arc<dyn ContainerRuntime>,
    image: String,
}

impl FingerprintAdapter {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, image: impl Into<String>) -> Self {
        Self { runtime, image: image.into() }
    }

    /// Turn a WhatWeb `--log-json` document into technologies and metadata.
    /// Nothing found is the `NotFound` sentinel, not an error.
    pub fn extract(raw: &RawToolReport) -> Result<FingerprintOutcome, RestackError> {
        let entries = match &raw.body {
            Value::Null => return Ok(FingerprintOutcome::not_found()),
            Value::Array(entries) => entries,
            other => {
                return Err(RestackError::Normalization(format!(
                    "whatweb artifact must be an array, got {}",
                    json_kind(other)
                )))
            }
        };

        let mut technologies: Vec<Technology> = Vec::new();
        let mut cookies: Vec<String> = Vec::new();
        let mut extra: BTreeMap<String, Vec<String>> = BTreeMap::new();

        let mut push_tech = |tech: Technology| {
            if !technologies.contains(&tech) {
                technologies.push(tech);
            }
        };

        for entry in entries {
            let Some(plugins) = entry.get("plugins").and_then(Value::as_object) else {
                continue;
            };
            for (name, data) in plugins {
                if IGNORED_PLUGINS.contains(&name.as_str()) {
                    continue;
                }
                let strings = string_list(data.get("string"));

                if METADATA_PLUGINS.contains(&name.as_str()) {
                    let slot = extra.entry(name.clone()).or_default();
                    for s in strings {
                        if !slot.contains(&s) {
                            slot.push(s);
                        }
                    }
                    continue;
                }

                match name.as_str() {
                    "Cookies" => {
                        for s in strings {
                            if !cookies.contains(&s) {
                                cookies.push(s);
                            }
                        }
                    }
                    "MetaGenerator" => {
                        for s in strings {
                            if let Some(tech) = parse_generator(&s) {
                                push_tech(tech);
                            }
                        }
                    }
                    _ => {
                        let versions = string_list(data.get("version"));
                        if versions.is_empty() {
                            push_tech(Technology::unversioned(name.clone()));
                        } else {
                            for v in versions {
                                push_tech(Technology::versioned(name.clone(), v));
                            }
                        }
                    }
                }
            }
        }

        if technologies.is_empty() {
            return Ok(FingerprintOutcome::not_found());
        }
        Ok(FingerprintOutcome::Found(FingerprintResult { technologies, cookies, extra }))
    }
}

/// `"WordPress 5.8; feature"` -> WordPress / 5.8
fn parse_generator(raw: &str) -> Option<Technology> {
    let head = raw.split(';').next()?.trim();
    if head.is_empty() {
        return None;
    }
    Some(match GENERATOR_RE.as_ref().and_then(|re| re.captures(head)) {
        Some(caps) => Technology::versioned(caps["name"].trim(), &caps["version"]),
        None => Technology::unversioned(head),
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

pub(crate) fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl ScannerAdapter for FingerprintAdapter {
    type Config = WhatWebConfig;
    type Overrides = ();

    fn kind(&self) -> ToolKind {
        ToolKind::WhatWeb
    }

    fn build_config(&self, target: &ScanTarget, _overrides: &()) -> Result<WhatWebConfig, RestackError> {
        let url = validate_url(&target.url)?.to_string();
        if self.image.trim().is_empty() {
            return Err(RestackError::Config("containers.whatweb_image is empty".into()));
        }
        let reports_dir = target
            .artifact
            .parent()
            .map(PathBuf::from)
            .ok_or_else(|| RestackError::Config("whatweb artifact path has no parent directory".into()))?;
        Ok(WhatWebConfig {
            session_id: target.session_id.clone(),
            url,
            image: self.image.clone(),
            container_name: format!("restack-whatweb-{}", target.session_id),
            reports_dir,
            output: target.artifact.clone(),
        })
    }

    async fn run(&self, config: &WhatWebConfig, cancel: &CancellationToken) -> Result<RawToolReport, RestackError> {
        ensure_parent(&config.output).await?;
        let spec = config.spec()?;
        info!(session_id = %config.session_id, tool = "whatweb", url = %config.url, "Starting fingerprint container");

        let handle = self.runtime.start(&spec).await?;
        let lease = ContainerLease::new(self.runtime.clone(), handle, None);

        let exit = tokio::select! {
            _ = cancel.cancelled() => Err(RestackError::Cancelled("whatweb cancelled".into())),
            code = self.runtime.wait(lease.handle()) => code,
        };
        lease.release().await;
        let exit = exit?;

        if !config.output.exists() {
            return Err(RestackError::ToolExecution(format!(
                "whatweb exited with {} and wrote no artifact",
                exit
            )));
        }
        if exit != 0 {
            warn!(session_id = %config.session_id, tool = "whatweb", exit, "Fingerprint container exited non-zero, using its artifact");
        }

        read_artifact(ToolKind::WhatWeb, &config.output, &config.session_id).await
    }
}
