mod common;

use std::collections::BTreeMap;
use std::path::Path;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use common::*;
use restack::api::{build_router, AppState};
use restack::db::{Database, PersistenceGateway};
use restack::models::{Report, SessionId, SessionStatus};

struct TestApp {
    _tmp: TempDir,
    db: Database,
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let db = Database::in_memory().unwrap();
        let orch = orchestrator(&config, FakeRuntime::new(), FakeZap::new(true), &db);
        Self { _tmp: tmp, db, state: AppState::new(orch) }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> Response<Body> {
        let builder = Request::builder().method(method).uri(uri).header("content-type", "application/json");
        let req = match body {
            Some(b) => builder.body(Body::from(serde_json::to_string(&b).unwrap())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        build_router(self.state.clone()).oneshot(req).await.unwrap()
    }
}

async fn response_json(response: Response<Body>) -> Value {
    let (parts, body) = response.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|e| panic!("JSON parse error: {}. Status: {}, body: {:?}", e, parts.status, String::from_utf8_lossy(&bytes)))
}

fn stored_report(id: &str, started_at: DateTime<Utc>) -> Report {
    Report {
        session_id: SessionId::from_existing(id),
        target: "http://example.test".into(),
        started_at,
        status: SessionStatus::Completed,
        scanners: vec!["wapiti".into()],
        total_findings: 0,
        critical_count: 0,
        fingerprint: None,
        cve_matches: None,
        tool_errors: Vec::new(),
        rules: BTreeMap::new(),
        findings: Vec::new(),
        scan_duration_seconds: 12.5,
    }
}

async fn seed(app: &TestApp, id: &str, started_at: DateTime<Utc>) {
    let inserted = app
        .db
        .insert_report(&stored_report(id, started_at), Path::new("/tmp/full_scan.json"))
        .await
        .unwrap();
    assert!(inserted);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new();
    let response = app.send("GET", "/api/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "restack");
}

#[tokio::test]
async fn test_create_scan_rejects_bad_url() {
    let app = TestApp::new();
    let response = app.send("POST", "/api/scans", Some(json!({"url": "not a url", "tools": ["whatweb"]}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["errorType"], "ConfigurationError");
}

#[tokio::test]
async fn test_create_scan_rejects_empty_tool_list() {
    let app = TestApp::new();
    let response = app.send("POST", "/api/scans", Some(json!({"url": "http://example.test", "tools": []}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_scan_accepts_and_reports_status() {
    let app = TestApp::new();
    let response = app.send("POST", "/api/scans", Some(json!({"url": "http://example.test", "tools": ["search_vulns"]}))).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = response_json(response).await;
    assert_eq!(body["target"], "http://example.test/");
    assert_eq!(body["tools"], json!(["whatweb", "search_vulns"]));
    let id = body["sessionId"].as_str().unwrap().to_string();

    let response = app.send("GET", &format!("/api/scans/{}/status", id), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["sessionId"], id.as_str());
    assert!(["pending", "running", "completed", "failed"].contains(&body["status"].as_str().unwrap()));
}

#[tokio::test]
async fn test_status_falls_back_to_stored_report() {
    let app = TestApp::new();
    seed(&app, "20240315_100000_000000-stored01", Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()).await;

    let response = app.send("GET", "/api/scans/20240315_100000_000000-stored01/status", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["status"], "completed");

    let response = app.send("GET", "/api/scans/nope/status", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_report() {
    let app = TestApp::new();
    let response = app.send("GET", "/api/reports/missing", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    seed(&app, "20240315_100000_000000-report01", Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()).await;
    let response = app.send("GET", "/api/reports/20240315_100000_000000-report01", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["sessionId"], "20240315_100000_000000-report01");
    assert_eq!(body["scanDurationSeconds"], 12.5);
}

#[tokio::test]
async fn test_reports_by_range() {
    let app = TestApp::new();
    seed(&app, "a", Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()).await;
    seed(&app, "b", Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()).await;

    let response = app.send("GET", "/api/reports?start=2024-03-01&end=2024-04-01", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["reports"][0]["sessionId"], "a");

    let response = app.send("GET", "/api/reports?start=2024-04-01T00:00:00Z&end=2024-03-01T00:00:00Z", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reports_by_period() {
    let app = TestApp::new();
    seed(&app, "a", Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap()).await;
    seed(&app, "b", Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap()).await;

    let total = |body: Value| body["total"].as_u64().unwrap();

    let r = app.send("GET", "/api/reports/period/week?date=2024-03-17", None).await;
    assert_eq!(total(response_json(r).await), 1);
    let r = app.send("GET", "/api/reports/period/week?date=2024-03-22", None).await;
    assert_eq!(total(response_json(r).await), 0);
    let r = app.send("GET", "/api/reports/period/month?year=2024&month=3", None).await;
    assert_eq!(total(response_json(r).await), 1);
    let r = app.send("GET", "/api/reports/period/year?year=2024", None).await;
    assert_eq!(total(response_json(r).await), 2);

    let r = app.send("GET", "/api/reports/period/month?year=2024&month=13", None).await;
    assert_eq!(r.status(), StatusCode::BAD_REQUEST);
    let r = app.send("GET", "/api/reports/period/decade", None).await;
    assert_eq!(r.status(), StatusCode::BAD_REQUEST);
}
