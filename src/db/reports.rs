use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::de::DeserializeOwned;

use super::Database;
use crate::errors::RestackError;
use crate::models::{Finding, Report, ReportSummary, RuleDefinition, SessionId, SessionStatus, Severity, ToolKind};

pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, RestackError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| RestackError::Persistence(format!("Bad timestamp '{}': {}", raw, e)))
}

fn from_json<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, RestackError> {
    serde_json::from_str(raw).map_err(|e| RestackError::Persistence(format!("Corrupt {} column: {}", what, e)))
}

/// Unit enum stored as its serde name.
fn from_name<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, RestackError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| RestackError::Persistence(format!("Unknown {} '{}'", what, raw)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RestackError> {
    serde_json::to_string(value).map_err(|e| RestackError::Persistence(format!("Serialization failed: {}", e)))
}

struct ReportRow {
    session_id: String,
    target: String,
    started_at: String,
    status: String,
    scanners: String,
    total_findings: i64,
    critical_count: i64,
    fingerprint: Option<String>,
    cve_matches: Option<String>,
    tool_errors: String,
    scan_duration_seconds: f64,
}

const REPORT_COLUMNS: &str = "session_id, target, started_at, status, scanners, total_findings, critical_count, fingerprint, cve_matches, tool_errors, scan_duration_seconds";

impl ReportRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            session_id: row.get(0)?,
            target: row.get(1)?,
            started_at: row.get(2)?,
            status: row.get(3)?,
            scanners: row.get(4)?,
            total_findings: row.get(5)?,
            critical_count: row.get(6)?,
            fingerprint: row.get(7)?,
            cve_matches: row.get(8)?,
            tool_errors: row.get(9)?,
            scan_duration_seconds: row.get(10)?,
        })
    }

    fn summary(&self) -> Result<ReportSummary, RestackError> {
        Ok(ReportSummary {
            session_id: SessionId::from_existing(self.session_id.clone()),
            target: self.target.clone(),
            started_at: parse_ts(&self.started_at)?,
            status: from_name::<SessionStatus>(&self.status, "status")?,
            total_findings: self.total_findings.max(0) as usize,
            critical_count: self.critical_count.max(0) as usize,
            scan_duration_seconds: self.scan_duration_seconds,
        })
    }
}

impl Database {
    /// Store a completed report with its rules and findings in one
    /// transaction. Returns `false` when the session was already stored.
    pub fn store_report(&self, report: &Report, artifact: &Path) -> Result<bool, RestackError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            &format!(
                "INSERT INTO reports ({}, artifact_path, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(session_id) DO NOTHING",
                REPORT_COLUMNS
            ),
            params![
                report.session_id.as_str(),
                report.target,
                fmt_ts(&report.started_at),
                report.status.as_str(),
                to_json(&report.scanners)?,
                report.total_findings as i64,
                report.critical_count as i64,
                report.fingerprint.as_ref().map(to_json).transpose()?,
                report.cve_matches.as_ref().map(to_json).transpose()?,
                to_json(&report.tool_errors)?,
                report.scan_duration_seconds,
                artifact.display().to_string(),
                fmt_ts(&Utc::now()),
            ],
        )?;
        if inserted == 0 {
            return Ok(false);
        }

        for (scanner, rules) in &report.rules {
            for rule in rules {
                tx.execute(
                    "INSERT INTO rules (session_id, scanner, id, short_description, full_description, help_text, help_markdown, properties)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) ON CONFLICT DO NOTHING",
                    params![
                        report.session_id.as_str(),
                        scanner.as_str(),
                        rule.id,
                        rule.short_description,
                        rule.full_description,
                        rule.help_text,
                        rule.help_markdown,
                        to_json(&rule.properties)?,
                    ],
                )?;
            }
        }

        for (position, f) in report.findings.iter().enumerate() {
            tx.execute(
                "INSERT INTO findings (id, session_id, position, scanner, rule_id, severity, confidence, endpoint, http_method, parameters, message, evidence, transaction_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) ON CONFLICT(id) DO NOTHING",
                params![
                    f.id,
                    report.session_id.as_str(),
                    position as i64,
                    f.scanner.as_str(),
                    f.rule_id,
                    f.severity.as_str(),
                    f.confidence,
                    f.endpoint,
                    f.http_method,
                    f.parameters,
                    f.message,
                    to_json(&f.evidence)?,
                    f.transaction.as_ref().map(to_json).transpose()?,
                ],
            )?;
        }

        tx.commit()?;
        Ok(true)
    }

    pub fn load_report(&self, id: &SessionId) -> Result<Option<Report>, RestackError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM reports WHERE session_id = ?1", REPORT_COLUMNS),
                params![id.as_str()],
                ReportRow::from_row,
            )
            .optional()?;
        let Some(row) = row else { return Ok(None) };

        let mut rules: BTreeMap<ToolKind, Vec<RuleDefinition>> = BTreeMap::new();
        let mut stmt = conn.prepare(
            "SELECT scanner, id, short_description, full_description, help_text, help_markdown, properties
             FROM rules WHERE session_id = ?1 ORDER BY rowid",
        )?;
        let rule_rows = stmt.query_map(params![id.as_str()], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, String>(6)?,
            ))
        })?;
        for r in rule_rows {
            let (scanner, rule_id, short, full, help, markdown, props) = r?;
            rules.entry(ToolKind::from_str(&scanner)?).or_default().push(RuleDefinition {
                id: rule_id,
                short_description: short,
                full_description: full,
                help_text: help,
                help_markdown: markdown,
                properties: from_json(&props, "rule properties")?,
            });
        }

        let mut stmt = conn.prepare(
            "SELECT id, scanner, rule_id, severity, confidence, endpoint, http_method, parameters, message, evidence, transaction_json
             FROM findings WHERE session_id = ?1 ORDER BY position",
        )?;
        let finding_rows = stmt.query_map(params![id.as_str()], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, Option<String>>(6)?,
                r.get::<_, Option<String>>(7)?,
                r.get::<_, Option<String>>(8)?,
                r.get::<_, String>(9)?,
                r.get::<_, Option<String>>(10)?,
            ))
        })?;
        let mut findings = Vec::new();
        for r in finding_rows {
            let (fid, scanner, rule_id, severity, confidence, endpoint, method, parameters, message, evidence, tx) = r?;
            findings.push(Finding {
                id: fid,
                session_id: id.clone(),
                scanner: ToolKind::from_str(&scanner)?,
                rule_id,
                severity: from_name::<Severity>(&severity, "severity")?,
                confidence,
                endpoint,
                http_method: method,
                parameters,
                message,
                evidence: from_json(&evidence, "evidence")?,
                transaction: tx.as_deref().map(|t| from_json(t, "transaction")).transpose()?,
            });
        }

        let summary = row.summary()?;
        Ok(Some(Report {
            session_id: summary.session_id,
            target: summary.target,
            started_at: summary.started_at,
            status: summary.status,
            scanners: from_json(&row.scanners, "scanners")?,
            total_findings: summary.total_findings,
            critical_count: summary.critical_count,
            fingerprint: row.fingerprint.as_deref().map(|f| from_json(f, "fingerprint")).transpose()?,
            cve_matches: row.cve_matches.as_deref().map(|c| from_json(c, "cve matches")).transpose()?,
            tool_errors: from_json(&row.tool_errors, "tool errors")?,
            rules,
            findings,
            scan_duration_seconds: summary.scan_duration_seconds,
        }))
    }

    /// Reports started in `[start, end)`, oldest first.
    pub fn list_reports_between(&self, start: &DateTime<Utc>, end: &DateTime<Utc>) -> Result<Vec<ReportSummary>, RestackError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reports WHERE started_at >= ?1 AND started_at < ?2 ORDER BY started_at",
            REPORT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![fmt_ts(start), fmt_ts(end)], ReportRow::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.summary()?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FingerprintOutcome, HttpTransaction, RuleProperties, ToolErrorMarker};
    use chrono::{SubsecRound, TimeZone};
    use serde_json::json;

    fn report(id: &str, started_at: DateTime<Utc>) -> Report {
        let sid = SessionId::from_existing(id);
        let finding = |n: usize, severity: Severity| Finding {
            id: format!("{}-zap-{}", id, n),
            session_id: sid.clone(),
            scanner: ToolKind::Zap,
            rule_id: "10038".into(),
            severity,
            confidence: Some("High".into()),
            endpoint: "/".into(),
            http_method: Some("GET".into()),
            parameters: None,
            message: Some("CSP header not set".into()),
            evidence: json!({"pluginId": "10038"}),
            transaction: (n == 0).then(|| HttpTransaction {
                id: "3".into(),
                request_header: "GET / HTTP/1.1".into(),
                request_body: String::new(),
                response_header: "HTTP/1.1 200 OK".into(),
                response_body: "<html/>".into(),
            }),
        };
        let mut rules = BTreeMap::new();
        rules.insert(ToolKind::Zap, vec![RuleDefinition {
            id: "10038".into(),
            short_description: "CSP header not set".into(),
            full_description: "No Content-Security-Policy".into(),
            help_text: "Set the header".into(),
            help_markdown: String::new(),
            properties: RuleProperties { cwe: Some("693".into()), wasc: Some("15".into()), risk_category: "medium".into(), tags: vec![] },
        }]);
        Report {
            session_id: sid.clone(),
            target: "http://example.test".into(),
            started_at,
            status: SessionStatus::Completed,
            scanners: vec!["zap".into(), "wapiti".into()],
            total_findings: 2,
            critical_count: 1,
            fingerprint: Some(FingerprintOutcome::not_found()),
            cve_matches: None,
            tool_errors: vec![ToolErrorMarker { tool: ToolKind::Wapiti, error_type: "ToolExecutionError".into(), message: "exit 1".into() }],
            rules,
            findings: vec![finding(0, Severity::High), finding(1, Severity::Medium)],
            scan_duration_seconds: 42.0,
        }
    }

    #[test]
    fn test_store_and_load_report() {
        let db = Database::in_memory().unwrap();
        let r = report("s1", Utc::now());
        assert!(db.store_report(&r, Path::new("/tmp/s1.json")).unwrap());

        let loaded = db.load_report(&r.session_id).unwrap().unwrap();
        assert_eq!(loaded.findings, r.findings);
        assert_eq!(loaded.rules, r.rules);
        assert_eq!(loaded.tool_errors, r.tool_errors);
        assert_eq!(loaded.fingerprint, r.fingerprint);
        assert_eq!(loaded.critical_count, 1);
        assert_eq!(loaded.started_at, r.started_at.trunc_subsecs(6));
    }

    #[test]
    fn test_store_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let r = report("s1", Utc::now());
        assert!(db.store_report(&r, Path::new("/tmp/s1.json")).unwrap());
        assert!(!db.store_report(&r, Path::new("/tmp/s1.json")).unwrap());
        assert_eq!(db.load_report(&r.session_id).unwrap().unwrap().findings.len(), 2);
    }

    #[test]
    fn test_missing_report() {
        let db = Database::in_memory().unwrap();
        assert!(db.load_report(&SessionId::from_existing("nope")).unwrap().is_none());
    }

    #[test]
    fn test_range_is_half_open() {
        let db = Database::in_memory().unwrap();
        let t = |d: u32| Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap();
        for (i, d) in [1, 5, 10].iter().enumerate() {
            db.store_report(&report(&format!("s{}", i), t(*d)), Path::new("/tmp/x.json")).unwrap();
        }
        let hits = db.list_reports_between(&t(1), &t(10)).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.session_id.as_str()).collect();
        assert_eq!(ids, vec!["s0", "s1"]);
    }
}
