use std::collections::HashSet;
use std::path::Path;

use tracing::warn;

use super::schema::CONFIG_SCHEMA;
use super::security::validate_security_patterns;
use super::types::RestackConfig;
use crate::errors::RestackError;
use crate::models::ToolKind;

const MAX_CONFIG_BYTES: u64 = 1_048_576;

/// Load a YAML config file through the full validation pipeline.
pub async fn parse_config(path: &Path) -> Result<RestackConfig, RestackError> {
    if !path.exists() {
        return Err(RestackError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(RestackError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<RestackConfig, RestackError> {
    let yaml: serde_yaml::Value = if content.trim().is_empty() {
        serde_yaml::Value::Mapping(Default::default())
    } else {
        serde_yaml::from_str(content)?
    };

    validate_security_patterns(&yaml)?;
    validate_schema(&yaml)?;

    let config: RestackConfig = serde_yaml::from_value(yaml)?;
    validate_semantics(&config)?;

    Ok(config)
}

/// Optional config: the defaults when no path is given.
pub async fn load_or_default(path: Option<&Path>) -> Result<RestackConfig, RestackError> {
    match path {
        Some(p) => parse_config(p).await,
        None => Ok(RestackConfig::default()),
    }
}

/// Structural check against the JSON schema. Advisory only.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), RestackError> {
    let json_value = serde_json::to_value(yaml)
        .map_err(|e| RestackError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| RestackError::Config(format!("Schema compilation error: {}", e)))?;

    if let Err(errors) = compiled.validate(&json_value) {
        for e in errors {
            warn!(validation_error = %e, path = %e.instance_path, "Config schema warning");
        }
    }

    Ok(())
}

fn validate_semantics(config: &RestackConfig) -> Result<(), RestackError> {
    let zap = &config.zap;
    if zap.readiness_attempts == 0 {
        return Err(RestackError::Config("zap.readiness_attempts must be at least 1".into()));
    }
    if zap.port_range_start >= zap.port_range_end {
        return Err(RestackError::Config(format!(
            "zap port range {}..{} is empty",
            zap.port_range_start, zap.port_range_end
        )));
    }
    if config.wapiti.tasks == 0 || config.wapiti.max_scan_time_secs == 0 {
        return Err(RestackError::Config("wapiti.tasks and wapiti.max_scan_time_secs must be non-zero".into()));
    }
    if config.scan.budget_secs == 0 {
        return Err(RestackError::Config("scan.budget_secs must be non-zero".into()));
    }

    let mut seen = HashSet::new();
    for dir in ToolKind::ALL
        .iter()
        .map(|t| config.paths.base_dir(*t))
        .chain(std::iter::once(config.paths.full_scan.as_path()))
    {
        if !seen.insert(dir) {
            return Err(RestackError::Config(format!(
                "Artifact directory {} is shared by more than one tool",
                dir.display()
            )));
        }
    }

    Ok(())
}
