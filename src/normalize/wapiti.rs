use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::{endpoint_path, finding_id, CanonicalReport};
use crate::errors::RestackError;
use crate::models::{Finding, HttpTransaction, RuleDefinition, RuleProperties, SessionId, ToolKind};
use super::severity::map_native;

/// Report sections that carry per-category finding lists, with the risk
/// category their rules are filed under.
const SECTIONS: &[(&str, &str)] = &[
    ("vulnerabilities", "vulnerability"),
    ("anomalies", "anomaly"),
    ("additionals", "additional"),
];

static CWE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"CWE-(\d+)").ok());

pub fn normalize(session_id: &SessionId, body: &Value) -> Result<CanonicalReport, RestackError> {
    let root = body
        .as_object()
        .ok_or_else(|| RestackError::Normalization("wapiti report is not an object".into()))?;
    for key in ["vulnerabilities", "classifications"] {
        if !root.get(key).is_some_and(Value::is_object) {
            return Err(RestackError::Normalization(format!("wapiti report missing '{}'", key)));
        }
    }
    let classifications = root.get("classifications").and_then(Value::as_object);

    let mut report = CanonicalReport::default();
    let mut seen_rules = HashSet::new();

    for (section, risk_category) in SECTIONS {
        let Some(categories) = root.get(*section).and_then(Value::as_object) else {
            continue;
        };
        for (category, entries) in categories {
            let Some(entries) = entries.as_array().filter(|e| !e.is_empty()) else {
                continue;
            };

            if seen_rules.insert(category.clone()) {
                report.rules.push(rule_for(category, risk_category, classifications.and_then(|c| c.get(category))));
            }

            for entry in entries {
                let n = report.findings.len();
                report.findings.push(finding_for(session_id, n, category, entry));
            }
        }
    }

    Ok(report)
}

fn rule_for(category: &str, risk_category: &str, class: Option<&Value>) -> RuleDefinition {
    let text = |k: &str| class.and_then(|c| c.get(k)).and_then(Value::as_str).unwrap_or_default().to_string();

    let references: Vec<(String, String)> = class
        .and_then(|c| c.get("ref"))
        .and_then(Value::as_object)
        .map(|refs: &Map<String, Value>| {
            refs.iter()
                .map(|(title, url)| (title.clone(), url.as_str().unwrap_or_default().to_string()))
                .collect()
        })
        .unwrap_or_default();

    let cwe = references.iter().find_map(|(title, _)| {
        CWE_RE
            .as_ref()
            .and_then(|re| re.captures(title))
            .map(|caps| caps[1].to_string())
    });

    let tags = class
        .and_then(|c| c.get("wstg"))
        .and_then(Value::as_array)
        .map(|w| w.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let full_description = text("desc");
    RuleDefinition {
        id: category.to_string(),
        short_description: category.to_string(),
        full_description: if full_description.is_empty() { category.to_string() } else { full_description },
        help_text: text("sol"),
        help_markdown: references
            .iter()
            .map(|(title, url)| format!("[{}]({})", title, url))
            .collect::<Vec<_>>()
            .join("\n"),
        properties: RuleProperties {
            cwe,
            wasc: None,
            risk_category: risk_category.to_string(),
            tags,
        },
    }
}

fn finding_for(session_id: &SessionId, n: usize, category: &str, entry: &Value) -> Finding {
    let text = |k: &str| entry.get(k).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string);

    let transaction = text("http_request").map(|request| HttpTransaction {
        id: n.to_string(),
        request_header: request,
        request_body: String::new(),
        response_header: String::new(),
        response_body: String::new(),
    });

    Finding {
        id: finding_id(session_id, ToolKind::Wapiti, n),
        session_id: session_id.clone(),
        scanner: ToolKind::Wapiti,
        rule_id: category.to_string(),
        severity: map_native(ToolKind::Wapiti, entry.get("level").unwrap_or(&Value::Null), None),
        confidence: None,
        endpoint: endpoint_path(text("path").as_deref().unwrap_or("/")),
        http_method: text("method"),
        parameters: text("parameter"),
        message: text("info"),
        evidence: entry.clone(),
        transaction,
    }
}
