pub const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS reports (
    session_id TEXT PRIMARY KEY,
    target TEXT NOT NULL,
    started_at TEXT NOT NULL,
    status TEXT NOT NULL,
    scanners TEXT NOT NULL,
    total_findings INTEGER NOT NULL DEFAULT 0,
    critical_count INTEGER NOT NULL DEFAULT 0,
    fingerprint TEXT,
    cve_matches TEXT,
    tool_errors TEXT NOT NULL DEFAULT '[]',
    artifact_path TEXT NOT NULL,
    scan_duration_seconds REAL NOT NULL DEFAULT 0.0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rules (
    session_id TEXT NOT NULL REFERENCES reports(session_id) ON DELETE CASCADE,
    scanner TEXT NOT NULL,
    id TEXT NOT NULL,
    short_description TEXT NOT NULL,
    full_description TEXT NOT NULL,
    help_text TEXT NOT NULL,
    help_markdown TEXT NOT NULL,
    properties TEXT NOT NULL,
    PRIMARY KEY (session_id, scanner, id)
);

CREATE TABLE IF NOT EXISTS findings (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES reports(session_id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    scanner TEXT NOT NULL,
    rule_id TEXT NOT NULL,
    severity TEXT NOT NULL,
    confidence TEXT,
    endpoint TEXT NOT NULL,
    http_method TEXT,
    parameters TEXT,
    message TEXT,
    evidence TEXT NOT NULL,
    transaction_json TEXT
);

CREATE TABLE IF NOT EXISTS scheduled_jobs (
    id TEXT PRIMARY KEY,
    trigger_kind TEXT NOT NULL,
    trigger_spec TEXT NOT NULL,
    target TEXT NOT NULL,
    config TEXT,
    label TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reports_started ON reports(started_at);
CREATE INDEX IF NOT EXISTS idx_findings_session ON findings(session_id);
CREATE INDEX IF NOT EXISTS idx_findings_severity ON findings(severity);
";
