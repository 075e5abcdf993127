mod common;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use common::*;
use restack::db::{Database, PersistenceGateway};
use restack::errors::RestackError;
use restack::models::{FingerprintOutcome, ScanRequest, SessionStatus, ToolKind};
use restack::pipeline::{ReplayOutput, ScanExecutor};
use restack::reporting::{read_full_scan, to_sarif};

#[tokio::test]
async fn test_fingerprint_only_scan_skips_cve_lookup() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = FakeRuntime::new();
    runtime.with_output(&config.containers.whatweb_image, whatweb_output(Some("3.6.0")));
    let db = Database::in_memory().unwrap();
    let orch = orchestrator(&config, runtime.clone(), FakeZap::new(true), &db);

    let report = orch.execute(ScanRequest::new("http://example.test", vec![ToolKind::WhatWeb])).await.unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.scanners, vec!["whatweb".to_string()]);
    assert_eq!(report.total_findings, 0);
    assert!(report.tool_errors.is_empty());
    assert!(report.cve_matches.is_none());
    match &report.fingerprint {
        Some(FingerprintOutcome::Found(result)) => {
            assert!(result.technologies.iter().any(|t| t.name == "JQuery" && t.version.as_deref() == Some("3.6.0")));
        }
        other => panic!("expected fingerprint, got {:?}", other),
    }
    assert_eq!(runtime.started_images(), vec![config.containers.whatweb_image.clone()]);
}

#[tokio::test]
async fn test_cve_lookup_follows_versioned_fingerprint() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = FakeRuntime::new();
    runtime.with_output(&config.containers.whatweb_image, whatweb_output(Some("3.6.0")));
    runtime.with_output(
        &config.containers.search_vulns_image,
        serde_json::json!({
            "JQuery 3.6.0": {"vulns": {"CVE-2020-11022": {"id": "CVE-2020-11022", "cvss": "6.1", "description": "XSS"}}}
        }),
    );
    let db = Database::in_memory().unwrap();
    let orch = orchestrator(&config, runtime.clone(), FakeZap::new(true), &db);

    let report = orch.execute(ScanRequest::new("http://example.test", vec![ToolKind::SearchVulns])).await.unwrap();

    assert_eq!(report.scanners, vec!["whatweb".to_string(), "search_vulns".to_string()]);
    let cves = report.cve_matches.expect("cve matches");
    assert_eq!(cves.found["JQuery 3.6.0"][0].id, "CVE-2020-11022");
    assert_eq!(runtime.started_images().len(), 2);
}

#[tokio::test]
async fn test_unversioned_fingerprint_never_starts_cve_container() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = FakeRuntime::new();
    runtime.with_output(&config.containers.whatweb_image, whatweb_output(None));
    let db = Database::in_memory().unwrap();
    let orch = orchestrator(&config, runtime.clone(), FakeZap::new(true), &db);

    let report = orch
        .execute(ScanRequest::new("http://example.test", vec![ToolKind::WhatWeb, ToolKind::SearchVulns]))
        .await
        .unwrap();

    assert!(report.cve_matches.is_none());
    assert!(report.error_for(ToolKind::SearchVulns).is_none());
    assert_eq!(runtime.started_images(), vec![config.containers.whatweb_image.clone()]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_wapiti_scan_counts_critical_findings() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.wapiti.binary = fake_wapiti(tmp.path(), &wapiti_output()).display().to_string();
    let db = Database::in_memory().unwrap();
    let orch = orchestrator(&config, FakeRuntime::new(), FakeZap::new(true), &db);

    let report = orch.execute(ScanRequest::new("http://example.test", vec![ToolKind::Wapiti])).await.unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.total_findings, 2);
    assert!(report.critical_count >= 1);
    assert_eq!(report.rules[&ToolKind::Wapiti].len(), 2);
    assert!(report.findings.iter().all(|f| f.scanner == ToolKind::Wapiti));

    let stored = db.get_report(&report.session_id).await.unwrap().expect("stored report");
    assert_eq!(stored.findings, report.findings);
    assert_eq!(stored.critical_count, report.critical_count);
    let merged = read_full_scan(&orch.registry().full_scan_path(&report.session_id)).await.unwrap();
    assert_eq!(merged.findings, report.findings);
    assert!(merged.fingerprint.is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn test_replay_matches_live_findings() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.wapiti.binary = fake_wapiti(tmp.path(), &wapiti_output()).display().to_string();
    let db = Database::in_memory().unwrap();
    let orch = orchestrator(&config, FakeRuntime::new(), FakeZap::new(true), &db);

    let report = orch.execute(ScanRequest::new("http://example.test", vec![ToolKind::Wapiti])).await.unwrap();
    let artifact = orch.registry().path_for(&report.session_id, ToolKind::Wapiti);

    match orch.replay(ToolKind::Wapiti, &artifact, &report.session_id).await.unwrap() {
        ReplayOutput::Findings(canonical) => assert_eq!(canonical.findings, report.findings),
        other => panic!("expected findings, got {:?}", other),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_replay_reads_sarif_export() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.wapiti.binary = fake_wapiti(tmp.path(), &wapiti_output()).display().to_string();
    let db = Database::in_memory().unwrap();
    let orch = orchestrator(&config, FakeRuntime::new(), FakeZap::new(true), &db);

    let report = orch.execute(ScanRequest::new("http://example.test", vec![ToolKind::Wapiti])).await.unwrap();
    let exported = tmp.path().join("export.sarif.json");
    std::fs::write(&exported, serde_json::to_vec(&to_sarif(&report)).unwrap()).unwrap();

    match orch.replay(ToolKind::Wapiti, &exported, &report.session_id).await.unwrap() {
        ReplayOutput::Findings(canonical) => {
            assert_eq!(canonical.findings.len(), report.findings.len());
            assert_eq!(canonical.rules.len(), report.rules[&ToolKind::Wapiti].len());
            let endpoints: Vec<_> = canonical.findings.iter().map(|f| f.endpoint.clone()).collect();
            let live: Vec<_> = report.findings.iter().map(|f| f.endpoint.clone()).collect();
            assert_eq!(endpoints, live);
            let severities: Vec<_> = canonical.findings.iter().map(|f| f.severity).collect();
            let live: Vec<_> = report.findings.iter().map(|f| f.severity).collect();
            assert_eq!(severities, live);
        }
        other => panic!("expected findings, got {:?}", other),
    }

    let missing = orch.replay(ToolKind::Zap, &exported, &report.session_id).await;
    assert!(matches!(missing, Err(RestackError::Normalization(_))));
}

#[tokio::test]
async fn test_unreachable_zap_is_recorded_without_failing_scan() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = FakeRuntime::new();
    runtime.with_output(&config.containers.whatweb_image, whatweb_output(Some("3.6.0")));
    let db = Database::in_memory().unwrap();
    let orch = orchestrator(&config, runtime.clone(), FakeZap::new(false), &db);

    let report = orch
        .execute(ScanRequest::new("http://example.test", vec![ToolKind::WhatWeb, ToolKind::Zap]))
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    let marker = report.error_for(ToolKind::Zap).expect("zap marker");
    assert_eq!(marker.error_type, "ToolUnavailableError");
    assert!(matches!(report.fingerprint, Some(FingerprintOutcome::Found(_))));

    let zap_container = format!("restack-zap-{}", report.session_id);
    assert_eq!(runtime.stop_count(&zap_container), 1);
    assert_eq!(runtime.remove_count(&zap_container), 1);
}

#[tokio::test(start_paused = true)]
async fn test_budget_overrun_becomes_timeout_marker_with_single_teardown() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.scan.budget_secs = 60;
    config.zap.poll_interval_secs = 5;
    let runtime = FakeRuntime::new();
    let zap = FakeZap::stuck_in(&["active"], vec![zap_alert()]);
    let db = Database::in_memory().unwrap();
    let orch = orchestrator(&config, runtime.clone(), zap.clone(), &db);

    let started = tokio::time::Instant::now();
    let report = orch.execute(ScanRequest::new("http://example.test", vec![ToolKind::Zap])).await.unwrap();

    assert!(started.elapsed() >= std::time::Duration::from_secs(60));
    assert!(started.elapsed() < std::time::Duration::from_secs(3600));
    assert_eq!(report.status, SessionStatus::Failed);
    let marker = report.error_for(ToolKind::Zap).expect("zap marker");
    assert_eq!(marker.error_type, "ToolExecutionError");
    assert!(marker.message.contains("scan budget"), "{}", marker.message);
    assert!(!zap.called("alerts"));

    let zap_container = format!("restack-zap-{}", report.session_id);
    assert_eq!(runtime.stop_count(&zap_container), 1);
    assert_eq!(runtime.remove_count(&zap_container), 1);
}

#[tokio::test]
async fn test_every_tool_failing_marks_report_failed() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = FakeRuntime::new();
    runtime.fail_start.lock().unwrap().push(config.containers.whatweb_image.clone());
    let db = Database::in_memory().unwrap();
    let orch = orchestrator(&config, runtime, FakeZap::new(true), &db);

    let report = orch.execute(ScanRequest::new("http://example.test", vec![ToolKind::WhatWeb])).await.unwrap();

    assert_eq!(report.status, SessionStatus::Failed);
    assert_eq!(report.tool_errors.len(), 1);
    assert!(db.get_report(&report.session_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_panicking_pipeline_marks_every_tool_it_owned() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = FakeRuntime::new();
    runtime.panic_on_start.lock().unwrap().push(config.containers.whatweb_image.clone());
    let db = Database::in_memory().unwrap();
    let orch = orchestrator(&config, runtime, FakeZap::new(true), &db);

    let report = orch
        .execute(ScanRequest::new("http://example.test", vec![ToolKind::WhatWeb, ToolKind::SearchVulns]))
        .await
        .unwrap();

    assert_eq!(report.status, SessionStatus::Failed);
    assert_eq!(report.tool_errors.len(), 2);
    for tool in [ToolKind::WhatWeb, ToolKind::SearchVulns] {
        let marker = report.error_for(tool).expect("marker per owned tool");
        assert!(marker.message.contains("pipeline task failed"), "{}", marker.message);
    }
}

#[tokio::test]
async fn test_invalid_request_runs_nothing() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = FakeRuntime::new();
    let db = Database::in_memory().unwrap();
    let orch = orchestrator(&config, runtime.clone(), FakeZap::new(true), &db);

    let err = orch.execute(ScanRequest::new("ftp://example.test", vec![ToolKind::WhatWeb])).await.unwrap_err();
    assert!(matches!(err, RestackError::InvalidTarget(_)));

    let mut request = ScanRequest::new("http://example.test", vec![ToolKind::WhatWeb, ToolKind::Wapiti]);
    request.overrides.wapiti.aggression = Some("reckless".into());
    let err = orch.execute(request).await.unwrap_err();
    assert!(matches!(err, RestackError::Config(_)));

    assert!(runtime.started_images().is_empty());
    let now = Utc::now();
    let stored = db.reports_between(now - Duration::days(1), now + Duration::days(1)).await.unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn test_each_scan_is_persisted_once() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let runtime = FakeRuntime::new();
    runtime.with_output(&config.containers.whatweb_image, whatweb_output(None));
    let db = Database::in_memory().unwrap();
    let orch = orchestrator(&config, runtime, FakeZap::new(true), &db);

    let first = orch.execute(ScanRequest::new("http://example.test", vec![ToolKind::WhatWeb])).await.unwrap();
    let second = orch.execute(ScanRequest::new("http://example.test", vec![ToolKind::WhatWeb])).await.unwrap();
    assert_ne!(first.session_id, second.session_id);

    let now = Utc::now();
    let stored = db.reports_between(now - Duration::days(1), now + Duration::days(1)).await.unwrap();
    assert_eq!(stored.len(), 2);
}
