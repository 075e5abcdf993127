//! Crawl-then-scan driver for the ZAP REST API.

pub mod client;
pub mod state;

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ensure_parent, validate_url, RawToolReport, ScanTarget, ScannerAdapter};
use crate::config::ZapDefaults;
use crate::container::{health_poll, ContainerLease, ContainerRuntime, ContainerSpec, PortAllocator, PortLease, PortMapping, VolumeMount};
use crate::errors::{poll_until, with_retry, PollPolicy, RestackError, RetryConfig};
use crate::models::{SessionId, ToolKind, ZapOverrides, ZapScanMode};

pub use client::{HttpZapConnector, ZapApi, ZapClient, ZapConnector};
pub use state::{CrawlPhase, PhaseTracker};

const ZAP_CONTAINER_PORT: u16 = 8080;
const ZAP_WORKDIR_MOUNT: &str = "/zap/wrk";

#[derive(Debug, Clone, PartialEq)]
pub struct ZapConfig {
    pub session_id: SessionId,
    pub url: String,
    /// Existing ZAP to drive instead of a per-session container.
    pub api_url: Option<String>,
    pub api_key: String,
    pub image: String,
    pub container_name: String,
    /// Session-scoped directory mounted into the container; deleted on teardown.
    pub workdir: PathBuf,
    pub output: PathBuf,
    pub scan_mode: ZapScanMode,
    pub deep_crawl: bool,
    pub ajax_max_depth: u32,
    pub page_load_secs: u64,
    pub readiness: PollPolicy,
    pub poll_interval: Duration,
    pub spider_timeout: Duration,
    pub ajax_timeout: Duration,
    pub deep_crawl_timeout: Duration,
    pub passive_timeout: Duration,
    pub active_timeout: Duration,
}

impl ZapConfig {
    pub fn container_spec(&self, host_port: u16) -> ContainerSpec {
        ContainerSpec {
            image: self.image.clone(),
            name: self.container_name.clone(),
            cmd: vec![
                "zap.sh".into(),
                "-daemon".into(),
                "-host".into(),
                "0.0.0.0".into(),
                "-port".into(),
                ZAP_CONTAINER_PORT.to_string(),
                "-config".into(),
                "api.addrs.addr.name=.*".into(),
                "-config".into(),
                "api.addrs.addr.regex=true".into(),
                "-config".into(),
                format!("api.key={}", self.api_key),
            ],
            volumes: vec![VolumeMount { host: self.workdir.clone(), container: ZAP_WORKDIR_MOUNT.into() }],
            ports: vec![PortMapping { container_port: ZAP_CONTAINER_PORT, host_port }],
            ..Default::default()
        }
    }
}

/// Owns whatever was started to make the API reachable for one run.
struct Service {
    api: Arc<dyn ZapApi>,
    container: Option<ContainerLease>,
    _port: Option<PortLease>,
}

impl Service {
    async fn shutdown(self) {
        if let Some(lease) = &self.container {
            lease.release().await;
        }
    }
}

pub struct CrawlScanAdapter {
    runtime: Arc<dyn ContainerRuntime>,
    ports: PortAllocator,
    connector: Arc<dyn ZapConnector>,
    defaults: ZapDefaults,
    image: String,
}

impl CrawlScanAdapter {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        ports: PortAllocator,
        connector: Arc<dyn ZapConnector>,
        defaults: ZapDefaults,
        image: impl Into<String>,
    ) -> Self {
        Self { runtime, ports, connector, defaults, image: image.into() }
    }

    /// Run the state machine and return the tracker alongside the outcome.
    pub async fn run_tracked(
        &self,
        config: &ZapConfig,
        cancel: &CancellationToken,
    ) -> (PhaseTracker, Result<RawToolReport, RestackError>) {
        let mut tracker = PhaseTracker::new(config.session_id.clone());
        let outcome = match self.bring_up(config, cancel).await {
            Ok(service) => {
                let outcome = crawl_and_scan(service.api.as_ref(), config, cancel, &mut tracker).await;
                service.shutdown().await;
                outcome
            }
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            warn!(session_id = %config.session_id, tool = "zap", phase = %tracker.current(), error = %e, "Crawl-then-scan failed");
            tracker.advance(CrawlPhase::Failed);
        }
        (tracker, outcome)
    }

    /// Idle -> ServiceReady: reach an existing API or start a container and
    /// wait for its API within the readiness budget.
    async fn bring_up(&self, config: &ZapConfig, cancel: &CancellationToken) -> Result<Service, RestackError> {
        if let Some(api_url) = &config.api_url {
            let api = self.connector.connect(api_url, &config.api_key)?;
            let check = api.clone();
            poll_until("zap readiness", config.readiness, cancel, || {
                let check = check.clone();
                async move { Ok(check.version().await.ok()) }
            })
            .await
            .map_err(|e| match e {
                RestackError::Timeout(msg) => RestackError::ToolUnavailable(format!("ZAP API at {} unreachable: {}", api_url, msg)),
                other => other,
            })?;
            return Ok(Service { api, container: None, _port: None });
        }

        let port = self.ports.reserve(&config.session_id)?;
        tokio::fs::create_dir_all(&config.workdir).await?;

        let spec = config.container_spec(port.port());
        let handle = match self.runtime.start(&spec).await {
            Ok(h) => h,
            Err(e) => {
                tokio::fs::remove_dir_all(&config.workdir).await.ok();
                return Err(RestackError::ToolUnavailable(format!("ZAP container failed to start: {}", e)));
            }
        };
        info!(session_id = %config.session_id, tool = "zap", port = port.port(), container = %handle.name, "ZAP container started");
        let lease = ContainerLease::new(self.runtime.clone(), handle, Some(config.workdir.clone()));

        let api = match self.connector.connect(&format!("http://127.0.0.1:{}", port.port()), &config.api_key) {
            Ok(api) => api,
            Err(e) => {
                lease.release().await;
                return Err(e);
            }
        };

        let check = api.clone();
        let ready = health_poll(self.runtime.as_ref(), lease.handle(), config.readiness, cancel, || {
            let check = check.clone();
            async move { Ok(check.version().await.is_ok()) }
        })
        .await;

        match ready {
            Ok(true) => Ok(Service { api, container: Some(lease), _port: Some(port) }),
            Ok(false) => {
                lease.release().await;
                Err(RestackError::ToolUnavailable(format!(
                    "ZAP API not reachable after {} attempts",
                    config.readiness.max_attempts
                )))
            }
            Err(e) => {
                lease.release().await;
                Err(e)
            }
        }
    }
}

async fn crawl_and_scan(
    api: &dyn ZapApi,
    config: &ZapConfig,
    cancel: &CancellationToken,
    tracker: &mut PhaseTracker,
) -> Result<RawToolReport, RestackError> {
    let url = config.url.as_str();
    let sid = &config.session_id;
    tracker.advance(CrawlPhase::ServiceReady);

    if let Err(e) = api.access_url(url).await {
        warn!(session_id = %sid, tool = "zap", error = %e, "Could not seed target, crawling anyway");
    }
    tracker.advance(CrawlPhase::ContextSeeded);

    tracker.advance(CrawlPhase::TraditionalCrawl);
    match api.spider_scan(url).await {
        Ok(scan_id) => {
            let scan_id = &scan_id;
            phase_poll("spider", sid, PollPolicy::for_timeout(config.spider_timeout, config.poll_interval), cancel, || async move {
                Ok((api.spider_status(scan_id).await? >= 100).then_some(()))
            })
            .await?
        }
        Err(e) => warn!(session_id = %sid, tool = "zap", error = %e, "Spider did not start"),
    }

    tracker.advance(CrawlPhase::AjaxCrawl);
    match api.ajax_spider_scan(url, config.ajax_max_depth).await {
        Ok(()) => {
            phase_poll("ajax spider", sid, PollPolicy::for_timeout(config.ajax_timeout, config.poll_interval), cancel, || async move {
                Ok((api.ajax_spider_status().await? != "running").then_some(()))
            })
            .await?
        }
        Err(e) => warn!(session_id = %sid, tool = "zap", error = %e, "AJAX spider did not start"),
    }

    if config.deep_crawl {
        tracker.advance(CrawlPhase::OptionalDeepCrawl);
        match api.client_spider_scan(url, config.page_load_secs).await {
            Ok(scan_id) => {
                let scan_id = &scan_id;
                phase_poll("client spider", sid, PollPolicy::for_timeout(config.deep_crawl_timeout, config.poll_interval), cancel, || async move {
                    Ok((api.client_spider_status(scan_id).await? >= 100).then_some(()))
                })
                .await?
            }
            Err(e) => debug!(session_id = %sid, tool = "zap", error = %e, "Deep crawl unavailable, skipping"),
        }
    }

    tracker.advance(CrawlPhase::ReadyToScan);
    match config.scan_mode {
        ZapScanMode::Passive => {
            tracker.advance(CrawlPhase::PassiveScanning);
            phase_poll("passive scan", sid, PollPolicy::for_timeout(config.passive_timeout, config.poll_interval), cancel, || async move {
                Ok((api.records_to_scan().await? == 0).then_some(()))
            })
            .await?;
        }
        ZapScanMode::Active => {
            tracker.advance(CrawlPhase::ActiveScanning);
            let scan_id = &api.active_scan(url).await?;
            phase_poll("active scan", sid, PollPolicy::for_timeout(config.active_timeout, config.poll_interval), cancel, || async move {
                Ok((api.active_scan_status(scan_id).await? >= 100).then_some(()))
            })
            .await?;
        }
    }

    let snapshot = with_retry("zap alerts", &RetryConfig::default(), cancel, || api.alerts(url)).await?;
    let alerts = enrich_alerts(api, sid, snapshot).await;
    info!(session_id = %sid, tool = "zap", alerts = alerts.len(), "Alerts snapshotted");

    let body = json!({ "alerts": alerts });
    ensure_parent(&config.output).await?;
    tokio::fs::write(&config.output, serde_json::to_vec_pretty(&body)?).await?;

    tracker.advance(CrawlPhase::Completed);
    Ok(RawToolReport {
        tool: ToolKind::Zap,
        session_id: sid.clone(),
        artifact: config.output.clone(),
        body,
    })
}

/// Bounded wait for one phase. Running out of time ends the phase with
/// partial results; only cancellation escapes.
async fn phase_poll<F, Fut>(
    phase: &str,
    session_id: &SessionId,
    policy: PollPolicy,
    cancel: &CancellationToken,
    check: F,
) -> Result<(), RestackError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<()>, RestackError>>,
{
    match poll_until(phase, policy, cancel, check).await {
        Ok(()) => Ok(()),
        Err(e @ RestackError::Cancelled(_)) => Err(e),
        Err(e) => {
            warn!(session_id = %session_id, tool = "zap", phase, error = %e, "Phase ended early, continuing with partial results");
            Ok(())
        }
    }
}

fn id_text(v: Option<&Value>) -> Option<String> {
    match v {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn message_id(alert: &Value) -> Option<String> {
    ["messageId", "sourceMessageId"].iter().find_map(|k| id_text(alert.get(*k)))
}

/// Attach the originating HTTP transaction to each alert when ZAP still has it.
async fn enrich_alerts(api: &dyn ZapApi, session_id: &SessionId, mut alerts: Vec<Value>) -> Vec<Value> {
    let mut ids: Vec<String> = alerts.iter().filter_map(message_id).collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return alerts;
    }

    let messages = match api.messages_by_id(&ids).await {
        Ok(m) => m,
        Err(e) => {
            warn!(session_id = %session_id, tool = "zap", error = %e, "Message lookup failed, keeping alerts without evidence");
            return alerts;
        }
    };

    let by_id: HashMap<String, Value> = messages
        .into_iter()
        .filter_map(|m| {
            let id = id_text(m.get("id"))?;
            let text = |k: &str| m.get(k).and_then(Value::as_str).unwrap_or_default().to_string();
            let transaction = json!({
                "id": id,
                "requestHeader": text("requestHeader"),
                "requestBody": text("requestBody"),
                "responseHeader": text("responseHeader"),
                "responseBody": text("responseBody"),
            });
            Some((id, transaction))
        })
        .collect();

    for alert in alerts.iter_mut() {
        let Some(id) = message_id(alert) else { continue };
        if let (Some(tx), Some(obj)) = (by_id.get(&id), alert.as_object_mut()) {
            obj.insert("transaction".into(), tx.clone());
        }
    }
    alerts
}

fn random_api_key() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect()
}

#[async_trait]
impl ScannerAdapter for CrawlScanAdapter {
    type Config = ZapConfig;
    type Overrides = ZapOverrides;

    fn kind(&self) -> ToolKind {
        ToolKind::Zap
    }

    fn build_config(&self, target: &ScanTarget, overrides: &ZapOverrides) -> Result<ZapConfig, RestackError> {
        let url = validate_url(&target.url)?.to_string();
        let d = &self.defaults;

        let api_url = match &overrides.api_url {
            Some(u) => Some(validate_url(u).map_err(|e| RestackError::Config(format!("zap api_url: {}", e)))?.to_string()),
            None => None,
        };
        if api_url.is_none() && self.image.trim().is_empty() {
            return Err(RestackError::Config("containers.zap_image is empty".into()));
        }
        let api_key = match &overrides.api_key {
            Some(k) if !k.trim().is_empty() => k.clone(),
            Some(_) => return Err(RestackError::Config("zap api_key must not be blank".into())),
            None if api_url.is_some() => {
                return Err(RestackError::Config("zap api_key is required with an external api_url".into()))
            }
            None => random_api_key(),
        };
        if d.readiness_attempts == 0 {
            return Err(RestackError::Config("zap readiness budget must be at least one attempt".into()));
        }
        let ajax_max_depth = overrides.ajax_max_depth.unwrap_or(d.ajax_max_depth);
        if ajax_max_depth == 0 {
            return Err(RestackError::Config("zap ajax_max_depth must be at least 1".into()));
        }

        let base = target
            .artifact
            .parent()
            .map(PathBuf::from)
            .ok_or_else(|| RestackError::Config("zap artifact path has no parent directory".into()))?;

        Ok(ZapConfig {
            session_id: target.session_id.clone(),
            url,
            api_url,
            api_key,
            image: self.image.clone(),
            container_name: format!("restack-zap-{}", target.session_id),
            workdir: base.join(format!("{}_home", target.session_id)),
            output: target.artifact.clone(),
            scan_mode: overrides.scan_mode.unwrap_or_default(),
            deep_crawl: overrides.deep_crawl.unwrap_or(d.deep_crawl),
            ajax_max_depth,
            page_load_secs: d.page_load_secs,
            readiness: PollPolicy::fixed(d.readiness_attempts, Duration::from_secs(d.readiness_interval_secs)),
            poll_interval: d.poll_interval(),
            spider_timeout: Duration::from_secs(d.spider_timeout_secs),
            ajax_timeout: Duration::from_secs(d.ajax_timeout_secs),
            deep_crawl_timeout: Duration::from_secs(d.deep_crawl_timeout_secs),
            passive_timeout: Duration::from_secs(d.passive_timeout_secs),
            active_timeout: Duration::from_secs(d.active_timeout_secs),
        })
    }

    async fn run(&self, config: &ZapConfig, cancel: &CancellationToken) -> Result<RawToolReport, RestackError> {
        self.run_tracked(config, cancel).await.1
    }

    async fn parse(&self, artifact: &std::path::Path, session_id: &SessionId) -> Result<RawToolReport, RestackError> {
        super::read_artifact(ToolKind::Zap, artifact, session_id).await
    }
}
