//! SARIF 2.1.0 rendering of a canonical report.

use serde_json::{json, Value};

use crate::errors::RestackError;
use crate::models::{Finding, HttpTransaction, Report, RuleDefinition, RuleProperties, SessionId, Severity, ToolKind};
use crate::normalize::severity::{from_sarif_level, to_sarif_level};
use crate::normalize::CanonicalReport;

const SARIF_SCHEMA: &str = "https://json.schemastore.org/sarif-2.1.0.json";

/// One run per finding-producing scanner that took part in the scan.
pub fn to_sarif(report: &Report) -> Value {
    let runs: Vec<Value> = ToolKind::ALL
        .iter()
        .filter(|t| t.produces_findings() && report.scanners.iter().any(|s| s == t.as_str()))
        .map(|tool| run_for(report, *tool))
        .collect();

    json!({
        "$schema": SARIF_SCHEMA,
        "version": "2.1.0",
        "runs": runs,
    })
}

fn run_for(report: &Report, tool: ToolKind) -> Value {
    let rules: Vec<Value> = report
        .rules
        .get(&tool)
        .map(|rules| rules.iter().map(rule_json).collect())
        .unwrap_or_default();
    let results: Vec<Value> = report
        .findings
        .iter()
        .filter(|f| f.scanner == tool)
        .map(result_json)
        .collect();

    json!({
        "tool": { "driver": { "name": tool.display_name(), "rules": rules } },
        "invocations": [{ "executionSuccessful": report.error_for(tool).is_none() }],
        "properties": { "sessionId": report.session_id, "target": report.target },
        "results": results,
    })
}

fn rule_json(rule: &RuleDefinition) -> Value {
    json!({
        "id": rule.id,
        "name": rule.short_description,
        "shortDescription": { "text": rule.short_description },
        "fullDescription": { "text": rule.full_description },
        "help": { "text": rule.help_text, "markdown": rule.help_markdown },
        "properties": rule.properties,
    })
}

fn result_json(finding: &Finding) -> Value {
    json!({
        "ruleId": finding.rule_id,
        "level": to_sarif_level(finding.severity),
        "message": { "text": finding.message.clone().unwrap_or_else(|| finding.rule_id.clone()) },
        "locations": [{
            "physicalLocation": { "artifactLocation": { "uri": finding.endpoint } }
        }],
        "properties": {
            "findingId": finding.id,
            "severity": finding.severity,
            "method": finding.http_method,
            "parameter": finding.parameters,
            "confidence": finding.confidence,
            "evidence": finding.evidence,
            "transaction": finding.transaction,
        },
    })
}

/// Read one SARIF run back into canonical form. A result's
/// `properties.severity` wins; without it the level goes through the SARIF
/// import table and is only as precise as SARIF's four levels.
pub fn import_run(session_id: &SessionId, scanner: ToolKind, run: &Value) -> Result<CanonicalReport, RestackError> {
    let results = run
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| RestackError::Normalization("SARIF run missing 'results'".into()))?;
    let rules = run
        .pointer("/tool/driver/rules")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let text = |v: &Value, ptr: &str| v.pointer(ptr).and_then(Value::as_str).unwrap_or_default().to_string();

    let mut out = CanonicalReport::default();
    for r in &rules {
        let id = text(r, "/id");
        if id.is_empty() || out.rules.iter().any(|existing| existing.id == id) {
            continue;
        }
        out.rules.push(RuleDefinition {
            id,
            short_description: text(r, "/shortDescription/text"),
            full_description: text(r, "/fullDescription/text"),
            help_text: text(r, "/help/text"),
            help_markdown: text(r, "/help/markdown"),
            properties: r
                .get("properties")
                .and_then(|p| serde_json::from_value::<RuleProperties>(p.clone()).ok())
                .unwrap_or_default(),
        });
    }

    for (n, r) in results.iter().enumerate() {
        let opt = |ptr: &str| r.pointer(ptr).and_then(Value::as_str).map(str::to_string);
        out.findings.push(Finding {
            id: opt("/properties/findingId").unwrap_or_else(|| format!("{}-{}-{}", session_id, scanner, n)),
            session_id: session_id.clone(),
            scanner,
            rule_id: text(r, "/ruleId"),
            severity: r
                .pointer("/properties/severity")
                .and_then(|v| serde_json::from_value::<Severity>(v.clone()).ok())
                .unwrap_or_else(|| from_sarif_level(&text(r, "/level"))),
            confidence: opt("/properties/confidence"),
            endpoint: opt("/locations/0/physicalLocation/artifactLocation/uri").unwrap_or_else(|| "/".into()),
            http_method: opt("/properties/method"),
            parameters: opt("/properties/parameter"),
            message: opt("/message/text"),
            evidence: r.pointer("/properties/evidence").cloned().unwrap_or(Value::Null),
            transaction: r
                .pointer("/properties/transaction")
                .and_then(|t| serde_json::from_value::<HttpTransaction>(t.clone()).ok()),
        });
    }
    Ok(out)
}
