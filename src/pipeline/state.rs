use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::adapters::crawl::ZapConfig;
use crate::adapters::fingerprint::WhatWebConfig;
use crate::adapters::subprocess::WapitiConfig;
use crate::errors::RestackError;
use crate::models::{
    CveResult, FingerprintOutcome, Report, ScanSession, SessionStatus, ToolErrorMarker, ToolKind,
};
use crate::normalize::{critical_count, CanonicalReport};

/// A validated scan: the session plus one fully-built config per selected tool.
///
/// The CVE lookup config is built later from the fingerprint output, so only
/// the decision to run it is recorded here.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub session: ScanSession,
    pub whatweb: Option<WhatWebConfig>,
    pub cve_lookup: bool,
    pub zap: Option<ZapConfig>,
    pub wapiti: Option<WapitiConfig>,
}

impl ScanPlan {
    pub fn tools(&self) -> Vec<ToolKind> {
        self.session.requested_tools.iter().copied().collect()
    }
}

/// What re-reading one archived artifact yields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "result", rename_all = "camelCase")]
pub enum ReplayOutput {
    Findings(CanonicalReport),
    Fingerprint(FingerprintOutcome),
    Cves(CveResult),
}

/// Contributions gathered from every pipeline of one scan.
#[derive(Debug, Default)]
pub struct ScanAccumulator {
    invoked: BTreeSet<ToolKind>,
    canonical: BTreeMap<ToolKind, CanonicalReport>,
    fingerprint: Option<FingerprintOutcome>,
    cve_matches: Option<CveResult>,
    errors: Vec<ToolErrorMarker>,
}

impl ScanAccumulator {
    pub fn findings(&mut self, tool: ToolKind, report: CanonicalReport) {
        self.invoked.insert(tool);
        self.canonical.insert(tool, report);
    }

    pub fn fingerprint(&mut self, outcome: FingerprintOutcome) {
        self.invoked.insert(ToolKind::WhatWeb);
        self.fingerprint = Some(outcome);
    }

    pub fn cve_matches(&mut self, result: CveResult) {
        self.invoked.insert(ToolKind::SearchVulns);
        self.cve_matches = Some(result);
    }

    pub fn fail(&mut self, tool: ToolKind, err: &RestackError) {
        self.invoked.insert(tool);
        self.errors.push(ToolErrorMarker::from_error(tool, err));
    }

    pub fn merge(&mut self, other: ScanAccumulator) {
        self.invoked.extend(other.invoked);
        self.canonical.extend(other.canonical);
        if other.fingerprint.is_some() {
            self.fingerprint = other.fingerprint;
        }
        if other.cve_matches.is_some() {
            self.cve_matches = other.cve_matches;
        }
        self.errors.extend(other.errors);
    }

    /// Fold everything into the aggregate report. The scan only counts as
    /// failed when no invoked tool produced anything.
    pub fn into_report(mut self, session: &ScanSession, scan_duration_seconds: f64) -> Report {
        self.errors.sort_by_key(|m| m.tool);

        let mut rules = BTreeMap::new();
        let mut findings = Vec::new();
        for (tool, canonical) in self.canonical {
            if !canonical.rules.is_empty() {
                rules.insert(tool, canonical.rules);
            }
            findings.extend(canonical.findings);
        }

        let status = if !self.invoked.is_empty() && self.errors.len() >= self.invoked.len() {
            SessionStatus::Failed
        } else {
            SessionStatus::Completed
        };

        Report {
            session_id: session.id.clone(),
            target: session.target.clone(),
            started_at: session.started_at,
            status,
            scanners: self.invoked.iter().map(|t| t.as_str().to_string()).collect(),
            total_findings: findings.len(),
            critical_count: critical_count(&findings),
            fingerprint: self.fingerprint,
            cve_matches: self.cve_matches,
            tool_errors: self.errors,
            rules,
            findings,
            scan_duration_seconds,
        }
    }
}
