use std::collections::HashSet;

use serde_json::Value;

use super::{endpoint_path, finding_id, CanonicalReport};
use super::severity::map_native;
use crate::errors::RestackError;
use crate::models::{Finding, HttpTransaction, RuleDefinition, RuleProperties, SessionId, ToolKind};

/// Accepts the snapshot written by the crawl adapter (`{"alerts": [...]}`)
/// or a bare alert list.
pub fn normalize(session_id: &SessionId, body: &Value) -> Result<CanonicalReport, RestackError> {
    let alerts = match body {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("alerts")
            .and_then(Value::as_array)
            .ok_or_else(|| RestackError::Normalization("zap report missing 'alerts' list".into()))?,
        _ => return Err(RestackError::Normalization("zap report is neither a list nor an object".into())),
    };

    let mut report = CanonicalReport::default();
    let mut seen_rules = HashSet::new();

    for alert in alerts {
        if !alert.is_object() {
            return Err(RestackError::Normalization("zap alert is not an object".into()));
        }
        let rule_id = rule_id(alert);
        if seen_rules.insert(rule_id.clone()) {
            report.rules.push(rule_for(&rule_id, alert));
        }
        let n = report.findings.len();
        report.findings.push(finding_for(session_id, n, rule_id, alert));
    }

    Ok(report)
}

fn text(alert: &Value, key: &str) -> Option<String> {
    match alert.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn rule_id(alert: &Value) -> String {
    ["pluginId", "alertRef", "alert", "name"]
        .iter()
        .find_map(|k| text(alert, k))
        .unwrap_or_else(|| "unknown".to_string())
}

/// ZAP uses `-1`/`0` for "no mapping".
fn mapped_id(alert: &Value, key: &str) -> Option<String> {
    text(alert, key).filter(|v| v != "-1" && v != "0")
}

fn rule_for(id: &str, alert: &Value) -> RuleDefinition {
    let name = text(alert, "alert").or_else(|| text(alert, "name")).unwrap_or_else(|| id.to_string());
    let help_markdown = text(alert, "reference")
        .map(|refs| {
            refs.split_whitespace()
                .filter(|r| r.starts_with("http"))
                .map(|r| format!("[{}]({})", r, r))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    RuleDefinition {
        id: id.to_string(),
        short_description: name.clone(),
        full_description: text(alert, "description").unwrap_or(name),
        help_text: text(alert, "solution").unwrap_or_default(),
        help_markdown,
        properties: RuleProperties {
            cwe: mapped_id(alert, "cweid"),
            wasc: mapped_id(alert, "wascid"),
            risk_category: text(alert, "risk").unwrap_or_else(|| "Informational".into()).to_lowercase(),
            tags: alert
                .get("tags")
                .and_then(Value::as_object)
                .map(|t| t.keys().cloned().collect())
                .unwrap_or_default(),
        },
    }
}

fn finding_for(session_id: &SessionId, n: usize, rule_id: String, alert: &Value) -> Finding {
    let confidence = text(alert, "confidence");
    let severity = map_native(
        ToolKind::Zap,
        alert.get("risk").or_else(|| alert.get("riskcode")).unwrap_or(&Value::Null),
        confidence.as_deref(),
    );
    let transaction = alert
        .get("transaction")
        .and_then(|t| serde_json::from_value::<HttpTransaction>(t.clone()).ok());

    let mut evidence = alert.clone();
    if let Some(obj) = evidence.as_object_mut() {
        obj.remove("transaction");
    }

    Finding {
        id: finding_id(session_id, ToolKind::Zap, n),
        session_id: session_id.clone(),
        scanner: ToolKind::Zap,
        rule_id,
        severity,
        confidence,
        endpoint: endpoint_path(&text(alert, "url").unwrap_or_else(|| "/".into())),
        http_method: text(alert, "method"),
        parameters: text(alert, "param"),
        message: text(alert, "alert").or_else(|| text(alert, "name")),
        evidence,
        transaction,
    }
}
