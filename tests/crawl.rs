mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use common::*;
use restack::adapters::crawl::{CrawlPhase, ZapConfig};
use restack::adapters::{CrawlScanAdapter, ScanTarget, ScannerAdapter};
use restack::config::ZapDefaults;
use restack::container::PortAllocator;
use restack::errors::RestackError;
use restack::models::{SessionId, ToolKind, ZapOverrides, ZapScanMode};
use restack::normalize::to_canonical;

fn adapter(runtime: Arc<FakeRuntime>, zap: Arc<FakeZap>, defaults: ZapDefaults) -> CrawlScanAdapter {
    CrawlScanAdapter::new(
        runtime,
        PortAllocator::new(defaults.preferred_port, defaults.port_range_start..=defaults.port_range_end),
        Arc::new(FakeZapConnector(zap)),
        defaults,
        "zaproxy/zap-stable",
    )
}

fn zap_config(tmp: &TempDir, adapter: &CrawlScanAdapter, overrides: &ZapOverrides) -> ZapConfig {
    let config = test_config(tmp.path());
    let target = ScanTarget {
        session_id: SessionId::from_existing("20240102_030405_000001-crawl"),
        url: "http://example.test".into(),
        artifact: config.paths.zap.join("20240102_030405_000001-crawl.json"),
    };
    adapter.build_config(&target, overrides).unwrap()
}

#[tokio::test]
async fn test_active_crawl_walks_every_phase_and_tears_down_once() {
    let tmp = TempDir::new().unwrap();
    let runtime = FakeRuntime::new();
    let zap = FakeZap::with_alerts(
        vec![zap_alert()],
        vec![json!({"id": "7", "requestHeader": "GET / HTTP/1.1", "responseHeader": "HTTP/1.1 200 OK"})],
    );
    let adapter = adapter(runtime.clone(), zap.clone(), test_config(tmp.path()).zap);
    let config = zap_config(&tmp, &adapter, &ZapOverrides::default());

    let (tracker, outcome) = adapter.run_tracked(&config, &CancellationToken::new()).await;
    let raw = outcome.unwrap();

    assert_eq!(
        tracker.history(),
        &[
            CrawlPhase::Idle,
            CrawlPhase::ServiceReady,
            CrawlPhase::ContextSeeded,
            CrawlPhase::TraditionalCrawl,
            CrawlPhase::AjaxCrawl,
            CrawlPhase::OptionalDeepCrawl,
            CrawlPhase::ReadyToScan,
            CrawlPhase::ActiveScanning,
            CrawlPhase::Completed,
        ]
    );
    assert!(zap.called("client_spider_scan"));
    assert!(zap.called("active_scan"));
    assert_eq!(runtime.stop_count(&config.container_name), 1);
    assert_eq!(runtime.remove_count(&config.container_name), 1);
    assert!(!config.workdir.exists());

    assert_eq!(raw.body["alerts"][0]["transaction"]["id"], "7");
    let canonical = to_canonical(&raw, ToolKind::Zap).unwrap();
    assert_eq!(canonical.findings.len(), 1);
    let tx = canonical.findings[0].transaction.as_ref().expect("transaction");
    assert_eq!(tx.request_header, "GET / HTTP/1.1");
}

#[tokio::test]
async fn test_passive_mode_without_deep_crawl() {
    let tmp = TempDir::new().unwrap();
    let runtime = FakeRuntime::new();
    let zap = FakeZap::new(true);
    let adapter = adapter(runtime.clone(), zap.clone(), test_config(tmp.path()).zap);
    let overrides = ZapOverrides { scan_mode: Some(ZapScanMode::Passive), deep_crawl: Some(false), ..Default::default() };
    let config = zap_config(&tmp, &adapter, &overrides);

    let (tracker, outcome) = adapter.run_tracked(&config, &CancellationToken::new()).await;
    outcome.unwrap();

    assert!(tracker.history().contains(&CrawlPhase::PassiveScanning));
    assert!(!tracker.history().contains(&CrawlPhase::OptionalDeepCrawl));
    assert!(zap.called("records_to_scan"));
    assert!(!zap.called("active_scan"));
    assert!(!zap.called("client_spider_scan"));
    assert_eq!(tracker.current(), CrawlPhase::Completed);
}

#[tokio::test]
async fn test_unready_api_releases_container_once() {
    let tmp = TempDir::new().unwrap();
    let runtime = FakeRuntime::new();
    let zap = FakeZap::new(false);
    let adapter = adapter(runtime.clone(), zap.clone(), test_config(tmp.path()).zap);
    let config = zap_config(&tmp, &adapter, &ZapOverrides::default());

    let (tracker, outcome) = adapter.run_tracked(&config, &CancellationToken::new()).await;

    match outcome {
        Err(RestackError::ToolUnavailable(msg)) => assert!(msg.contains("3 attempts")),
        other => panic!("expected ToolUnavailable, got {:?}", other.map(|r| r.body)),
    }
    assert_eq!(tracker.history(), &[CrawlPhase::Idle, CrawlPhase::Failed]);
    assert_eq!(runtime.stop_count(&config.container_name), 1);
    assert_eq!(runtime.remove_count(&config.container_name), 1);
    assert!(!config.workdir.exists());
    assert!(!config.output.exists());
}

#[tokio::test]
async fn test_cancelled_run_still_tears_down() {
    let tmp = TempDir::new().unwrap();
    let runtime = FakeRuntime::new();
    let adapter = adapter(runtime.clone(), FakeZap::new(true), test_config(tmp.path()).zap);
    let config = zap_config(&tmp, &adapter, &ZapOverrides::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let (_, outcome) = adapter.run_tracked(&config, &cancel).await;

    assert!(matches!(outcome, Err(RestackError::Cancelled(_))));
    assert_eq!(runtime.stop_count(&config.container_name), 1);
    assert_eq!(runtime.remove_count(&config.container_name), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_spider_times_out_and_scan_still_snapshots_alerts() {
    let tmp = TempDir::new().unwrap();
    let runtime = FakeRuntime::new();
    let zap = FakeZap::stuck_in(&["spider"], vec![zap_alert()]);
    let mut defaults = test_config(tmp.path()).zap;
    defaults.poll_interval_secs = 5;
    defaults.spider_timeout_secs = 30;
    let adapter = adapter(runtime.clone(), zap.clone(), defaults);
    let config = zap_config(&tmp, &adapter, &ZapOverrides::default());

    let started = Instant::now();
    let (tracker, outcome) = adapter.run_tracked(&config, &CancellationToken::new()).await;
    let raw = outcome.unwrap();

    assert_eq!(zap.count("spider_status"), 7);
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(tracker.history().contains(&CrawlPhase::AjaxCrawl));
    assert!(zap.called("active_scan"));
    assert!(zap.called("alerts"));
    assert_eq!(tracker.current(), CrawlPhase::Completed);
    assert_eq!(raw.body["alerts"].as_array().unwrap().len(), 1);
    assert_eq!(runtime.stop_count(&config.container_name), 1);
}

#[tokio::test(start_paused = true)]
async fn test_undrained_passive_queue_ends_with_partial_results() {
    let tmp = TempDir::new().unwrap();
    let runtime = FakeRuntime::new();
    let zap = FakeZap::stuck_in(&["passive"], vec![]);
    let mut defaults = test_config(tmp.path()).zap;
    defaults.poll_interval_secs = 10;
    defaults.passive_timeout_secs = 60;
    let adapter = adapter(runtime.clone(), zap.clone(), defaults);
    let overrides = ZapOverrides { scan_mode: Some(ZapScanMode::Passive), ..Default::default() };
    let config = zap_config(&tmp, &adapter, &overrides);

    let (tracker, outcome) = adapter.run_tracked(&config, &CancellationToken::new()).await;

    assert!(outcome.is_ok());
    assert_eq!(zap.count("records_to_scan"), 7);
    assert_eq!(tracker.current(), CrawlPhase::Completed);
    assert!(config.output.exists());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_stuck_phase_tears_down_once() {
    let tmp = TempDir::new().unwrap();
    let runtime = FakeRuntime::new();
    let zap = FakeZap::stuck_in(&["active"], vec![zap_alert()]);
    let mut defaults = test_config(tmp.path()).zap;
    defaults.poll_interval_secs = 5;
    let adapter = adapter(runtime.clone(), zap.clone(), defaults);
    let config = zap_config(&tmp, &adapter, &ZapOverrides::default());
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(42)).await;
            cancel.cancel();
        });
    }

    let (tracker, outcome) = adapter.run_tracked(&config, &cancel).await;

    assert!(matches!(outcome, Err(RestackError::Cancelled(_))));
    assert!(zap.count("active_scan_status") >= 8);
    assert!(!zap.called("alerts"));
    assert_eq!(tracker.current(), CrawlPhase::Failed);
    assert_eq!(runtime.stop_count(&config.container_name), 1);
    assert_eq!(runtime.remove_count(&config.container_name), 1);
    assert!(!config.output.exists());
}

#[tokio::test]
async fn test_alert_without_matching_message_keeps_no_transaction() {
    let tmp = TempDir::new().unwrap();
    let runtime = FakeRuntime::new();
    let zap = FakeZap::with_alerts(
        vec![zap_alert()],
        vec![json!({"id": "99", "requestHeader": "GET /other HTTP/1.1", "responseHeader": "HTTP/1.1 404 Not Found"})],
    );
    let adapter = adapter(runtime, zap.clone(), test_config(tmp.path()).zap);
    let config = zap_config(&tmp, &adapter, &ZapOverrides::default());

    let (_, outcome) = adapter.run_tracked(&config, &CancellationToken::new()).await;
    let raw = outcome.unwrap();

    assert!(zap.called("messages_by_id"));
    assert!(raw.body["alerts"][0].get("transaction").is_none());
    let canonical = to_canonical(&raw, ToolKind::Zap).unwrap();
    assert_eq!(canonical.findings.len(), 1);
    assert!(canonical.findings[0].transaction.is_none());
}
