//! Native severity vocabularies -> canonical [`Severity`].
//!
//! Every table is total. Anything unrecognised lands on `Note`.

use serde_json::Value;

use crate::models::{Severity, ToolKind};

/// Wapiti `level`: 0 info, 1 low, 2 medium, 3 high, 4 critical.
fn wapiti_level(level: &Value) -> Severity {
    match as_int(level) {
        Some(1) => Severity::Low,
        Some(2) => Severity::Medium,
        Some(3) => Severity::High,
        Some(4) => Severity::Critical,
        _ => Severity::Note,
    }
}

/// ZAP `risk` by name or `riskcode`. High with a confirmed confidence
/// is promoted to Critical.
fn zap_risk(risk: &Value, confidence: Option<&str>) -> Severity {
    let base = match risk {
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "informational" | "info" | "0" => Severity::Note,
            "low" | "1" => Severity::Low,
            "medium" | "2" => Severity::Medium,
            "high" | "3" => Severity::High,
            _ => Severity::Note,
        },
        Value::Number(_) => match as_int(risk) {
            Some(1) => Severity::Low,
            Some(2) => Severity::Medium,
            Some(3) => Severity::High,
            _ => Severity::Note,
        },
        _ => Severity::Note,
    };

    let confirmed = confidence.is_some_and(|c| c.trim().eq_ignore_ascii_case("confirmed"));
    if base == Severity::High && confirmed {
        Severity::Critical
    } else {
        base
    }
}

/// SARIF `level` -> canonical.
pub fn from_sarif_level(level: &str) -> Severity {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => Severity::Medium,
        "error" => Severity::High,
        _ => Severity::Note,
    }
}

/// Canonical -> SARIF `level`.
pub fn to_sarif_level(severity: Severity) -> &'static str {
    match severity {
        Severity::Note | Severity::Low => "note",
        Severity::Medium => "warning",
        Severity::High | Severity::Critical => "error",
    }
}

/// Tool-keyed entry point. Tools without findings have no scale.
pub fn map_native(tool: ToolKind, native: &Value, confidence: Option<&str>) -> Severity {
    match tool {
        ToolKind::Wapiti => wapiti_level(native),
        ToolKind::Zap => zap_risk(native, confidence),
        ToolKind::WhatWeb | ToolKind::SearchVulns => Severity::Note,
    }
}

fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
