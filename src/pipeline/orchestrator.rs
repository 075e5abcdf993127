use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state::{ReplayOutput, ScanAccumulator, ScanPlan};
use crate::adapters::crawl::ZapConfig;
use crate::adapters::fingerprint::WhatWebConfig;
use crate::adapters::subprocess::WapitiConfig;
use crate::adapters::{
    validate_url, CrawlScanAdapter, CveLookupAdapter, FingerprintAdapter, RawToolReport, ScanTarget, ScannerAdapter,
    SubprocessScanAdapter, ZapConnector,
};
use crate::config::RestackConfig;
use crate::container::{ContainerRuntime, PortAllocator};
use crate::db::PersistenceGateway;
use crate::errors::RestackError;
use crate::models::{FingerprintOutcome, Report, ScanRequest, ScanSession, SessionId, SessionStatus, ToolKind};
use crate::normalize::{to_canonical, CanonicalReport};
use crate::reporting::{import_run, write_full_scan};
use crate::session::SessionRegistry;

/// Entry point shared by the CLI, the HTTP API and the scheduler.
#[async_trait]
pub trait ScanExecutor: Send + Sync {
    async fn execute(&self, request: ScanRequest) -> Result<Report, RestackError>;
}

/// Drives the selected adapters for one scan and persists the merged report.
///
/// Cheap to clone; every pipeline runs on its own task with a clone.
#[derive(Clone)]
pub struct ScanOrchestrator {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn PersistenceGateway>,
    fingerprint: Arc<FingerprintAdapter>,
    cve: Arc<CveLookupAdapter>,
    crawl: Arc<CrawlScanAdapter>,
    wapiti: Arc<SubprocessScanAdapter>,
    budget: Duration,
    cancel_token: CancellationToken,
}

impl ScanOrchestrator {
    pub fn new(
        config: &RestackConfig,
        runtime: Arc<dyn ContainerRuntime>,
        connector: Arc<dyn ZapConnector>,
        store: Arc<dyn PersistenceGateway>,
    ) -> Self {
        let images = &config.containers;
        Self {
            registry: Arc::new(SessionRegistry::new(config.paths.clone())),
            store,
            fingerprint: Arc::new(FingerprintAdapter::new(runtime.clone(), images.whatweb_image.clone())),
            cve: Arc::new(CveLookupAdapter::new(runtime.clone(), images.search_vulns_image.clone())),
            crawl: Arc::new(CrawlScanAdapter::new(
                runtime,
                PortAllocator::from_config(&config.zap),
                connector,
                config.zap.clone(),
                images.zap_image.clone(),
            )),
            wapiti: Arc::new(SubprocessScanAdapter::new(config.wapiti.clone())),
            budget: config.scan.budget(),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Replace the root cancel token, e.g. with one tied to process shutdown.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn PersistenceGateway> {
        &self.store
    }

    /// Validate the request, allocate its session and build every tool
    /// config up front. Nothing has run yet when this fails.
    pub fn prepare(&self, request: &ScanRequest) -> Result<ScanPlan, RestackError> {
        let url = validate_url(&request.url)?.to_string();
        if request.tools.is_empty() {
            return Err(RestackError::Config("at least one tool must be selected".into()));
        }

        let mut tools: BTreeSet<ToolKind> = request.tools.iter().copied().collect();
        if tools.contains(&ToolKind::SearchVulns) {
            tools.insert(ToolKind::WhatWeb);
        }

        let session = self.registry.open(&url, tools.iter().copied());
        let built = self.build_plan(session.clone(), &url, &tools, request);
        if built.is_err() {
            self.registry.discard(&session.id);
        }
        built
    }

    fn build_plan(
        &self,
        session: ScanSession,
        url: &str,
        tools: &BTreeSet<ToolKind>,
        request: &ScanRequest,
    ) -> Result<ScanPlan, RestackError> {
        let target = |tool: ToolKind| ScanTarget {
            session_id: session.id.clone(),
            url: url.to_string(),
            artifact: self.registry.path_for(&session.id, tool),
        };

        let whatweb = match tools.contains(&ToolKind::WhatWeb) {
            true => Some(self.fingerprint.build_config(&target(ToolKind::WhatWeb), &())?),
            false => None,
        };
        let zap = match tools.contains(&ToolKind::Zap) {
            true => Some(self.crawl.build_config(&target(ToolKind::Zap), &request.overrides.zap)?),
            false => None,
        };
        let wapiti = match tools.contains(&ToolKind::Wapiti) {
            true => Some(self.wapiti.build_config(&target(ToolKind::Wapiti), &request.overrides.wapiti)?),
            false => None,
        };

        Ok(ScanPlan {
            cve_lookup: tools.contains(&ToolKind::SearchVulns),
            session,
            whatweb,
            zap,
            wapiti,
        })
    }

    /// Run a prepared scan to completion and persist it exactly once.
    pub async fn run(&self, plan: ScanPlan) -> Result<Report, RestackError> {
        let session = plan.session.clone();
        let sid = session.id.clone();
        self.registry.set_status(&sid, SessionStatus::Running);
        info!(session_id = %sid, target = %session.target, tools = ?plan.tools(), "Scan started");

        let started = Instant::now();
        let cancel = self.cancel_token.child_token();
        let mut pipelines: Vec<(Vec<ToolKind>, JoinHandle<ScanAccumulator>)> = Vec::new();

        if let Some(config) = plan.whatweb {
            let this = self.clone();
            let cancel = cancel.clone();
            let with_cve = plan.cve_lookup;
            let mut tools = vec![ToolKind::WhatWeb];
            if with_cve {
                tools.push(ToolKind::SearchVulns);
            }
            pipelines.push((
                tools,
                tokio::spawn(async move { this.fingerprint_pipeline(config, with_cve, &session.target, &cancel).await }),
            ));
        }
        if let Some(config) = plan.zap {
            let this = self.clone();
            let cancel = cancel.clone();
            pipelines.push((vec![ToolKind::Zap], tokio::spawn(async move { this.zap_pipeline(config, &cancel).await })));
        }
        if let Some(config) = plan.wapiti {
            let this = self.clone();
            let cancel = cancel.clone();
            pipelines.push((vec![ToolKind::Wapiti], tokio::spawn(async move { this.wapiti_pipeline(config, &cancel).await })));
        }

        let mut acc = ScanAccumulator::default();
        for (tools, handle) in pipelines {
            match handle.await {
                Ok(part) => acc.merge(part),
                Err(e) => {
                    error!(session_id = %sid, tools = ?tools, error = %e, "Scan pipeline task failed");
                    let err = RestackError::Internal(format!("pipeline task failed: {}", e));
                    for tool in tools {
                        acc.fail(tool, &err);
                    }
                }
            }
        }

        let report = acc.into_report(&plan.session, started.elapsed().as_secs_f64());
        match self.persist(&report).await {
            Ok(()) => {
                self.registry.set_status(&sid, report.status);
                info!(
                    session_id = %sid,
                    status = report.status.as_str(),
                    total_findings = report.total_findings,
                    critical_count = report.critical_count,
                    tool_errors = report.tool_errors.len(),
                    duration_secs = format!("{:.1}", report.scan_duration_seconds),
                    "Scan finished"
                );
                Ok(report)
            }
            Err(e) => {
                self.registry.set_status(&sid, SessionStatus::Failed);
                error!(session_id = %sid, error = %e, "Scan results could not be saved");
                Err(e)
            }
        }
    }

    /// Refresh the vulnerability database inside the shared search_vulns
    /// service. Runs outside any scan session.
    pub async fn update_vulndb(&self) -> Result<(), RestackError> {
        let dir = self.registry.base_dir(ToolKind::SearchVulns).to_path_buf();
        self.cve.update_database(&dir, &self.cancel_token).await
    }

    /// Re-read an artifact produced by an earlier run of `tool` and
    /// normalize it the same way a live scan would.
    pub async fn replay(&self, tool: ToolKind, artifact: &Path, session_id: &SessionId) -> Result<ReplayOutput, RestackError> {
        Ok(match tool {
            ToolKind::WhatWeb => {
                let raw = self.fingerprint.parse(artifact, session_id).await?;
                ReplayOutput::Fingerprint(FingerprintAdapter::extract(&raw)?)
            }
            ToolKind::SearchVulns => {
                let raw = self.cve.parse(artifact, session_id).await?;
                ReplayOutput::Cves(CveLookupAdapter::extract(&raw)?)
            }
            ToolKind::Zap => ReplayOutput::Findings(replay_findings(&self.crawl.parse(artifact, session_id).await?, tool)?),
            ToolKind::Wapiti => ReplayOutput::Findings(replay_findings(&self.wapiti.parse(artifact, session_id).await?, tool)?),
        })
    }

    async fn persist(&self, report: &Report) -> Result<(), RestackError> {
        let path = self.registry.full_scan_path(&report.session_id);
        write_full_scan(&path, report)
            .await
            .map_err(|e| RestackError::Persistence(format!("full-scan artifact {}: {}", path.display(), e)))?;
        if !self.store.insert_report(report, &path).await? {
            warn!(session_id = %report.session_id, "Report was already stored, keeping the first copy");
        }
        Ok(())
    }

    /// Run `work` under the per-adapter budget. Running out of budget cancels
    /// the adapter's token so it can tear down before returning.
    async fn within_budget<T, F, Fut>(&self, tool: ToolKind, parent: &CancellationToken, work: F) -> Result<T, RestackError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, RestackError>>,
    {
        let token = parent.child_token();
        let watchdog = {
            let token = token.clone();
            let budget = self.budget;
            tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                token.cancel();
            })
        };
        let result = work(token.clone()).await;
        watchdog.abort();

        match result {
            Err(RestackError::Cancelled(_)) if token.is_cancelled() && !parent.is_cancelled() => Err(RestackError::Timeout(
                format!("{} exceeded the {}s scan budget", tool, self.budget.as_secs()),
            )),
            other => other,
        }
    }

    async fn fingerprint_pipeline(
        &self,
        config: WhatWebConfig,
        with_cve: bool,
        url: &str,
        cancel: &CancellationToken,
    ) -> ScanAccumulator {
        let mut acc = ScanAccumulator::default();
        let sid = config.session_id.clone();

        let outcome = self
            .within_budget(ToolKind::WhatWeb, cancel, |token| async move {
                let raw = self.fingerprint.run(&config, &token).await?;
                FingerprintAdapter::extract(&raw)
            })
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session_id = %sid, tool = "whatweb", error = %e, "Fingerprinting failed");
                acc.fail(ToolKind::WhatWeb, &e);
                return acc;
            }
        };

        let versioned = match &outcome {
            FingerprintOutcome::Found(result) if result.has_versioned() => Some(result.clone()),
            _ => None,
        };
        acc.fingerprint(outcome);

        if !with_cve {
            return acc;
        }
        let Some(result) = versioned else {
            debug!(session_id = %sid, "No versioned technologies, skipping CVE lookup");
            return acc;
        };

        let target = ScanTarget {
            session_id: sid.clone(),
            url: url.to_string(),
            artifact: self.registry.path_for(&sid, ToolKind::SearchVulns),
        };
        let cves = self
            .within_budget(ToolKind::SearchVulns, cancel, |token| async move {
                let config = self.cve.build_config(&target, &result)?;
                let raw = self.cve.run(&config, &token).await?;
                CveLookupAdapter::extract(&raw)
            })
            .await;

        match cves {
            Ok(cves) => {
                info!(session_id = %sid, tool = "search_vulns", cves = cves.total_cves(), "CVE lookup finished");
                acc.cve_matches(cves);
            }
            Err(e) => {
                warn!(session_id = %sid, tool = "search_vulns", error = %e, "CVE lookup failed");
                acc.fail(ToolKind::SearchVulns, &e);
            }
        }
        acc
    }

    async fn zap_pipeline(&self, config: ZapConfig, cancel: &CancellationToken) -> ScanAccumulator {
        let sid = config.session_id.clone();
        let result = self
            .within_budget(ToolKind::Zap, cancel, |token| async move {
                let raw = self.crawl.run(&config, &token).await?;
                to_canonical(&raw, ToolKind::Zap)
            })
            .await;
        self.collect(ToolKind::Zap, &sid, result)
    }

    async fn wapiti_pipeline(&self, config: WapitiConfig, cancel: &CancellationToken) -> ScanAccumulator {
        let sid = config.session_id.clone();
        let result = self
            .within_budget(ToolKind::Wapiti, cancel, |token| async move {
                let raw = self.wapiti.run(&config, &token).await?;
                to_canonical(&raw, ToolKind::Wapiti)
            })
            .await;
        self.collect(ToolKind::Wapiti, &sid, result)
    }

    fn collect(
        &self,
        tool: ToolKind,
        sid: &SessionId,
        result: Result<CanonicalReport, RestackError>,
    ) -> ScanAccumulator {
        let mut acc = ScanAccumulator::default();
        match result {
            Ok(canonical) => {
                info!(session_id = %sid, tool = tool.as_str(), findings = canonical.findings.len(), rules = canonical.rules.len(), "Tool finished");
                acc.findings(tool, canonical);
            }
            Err(e) => {
                warn!(session_id = %sid, tool = tool.as_str(), error_type = e.marker_type(), error = %e, "Tool failed, recording marker");
                acc.fail(tool, &e);
            }
        }
        acc
    }
}

#[async_trait]
impl ScanExecutor for ScanOrchestrator {
    async fn execute(&self, request: ScanRequest) -> Result<Report, RestackError> {
        let plan = self.prepare(&request)?;
        self.run(plan).await
    }
}

/// Native artifacts go through the normalizer; a SARIF export is read back
/// from the run this tool produced.
fn replay_findings(raw: &RawToolReport, tool: ToolKind) -> Result<CanonicalReport, RestackError> {
    let Some(runs) = raw.body.get("runs").and_then(Value::as_array) else {
        return to_canonical(raw, tool);
    };
    let run = runs
        .iter()
        .find(|r| r.pointer("/tool/driver/name").and_then(Value::as_str) == Some(tool.display_name()))
        .ok_or_else(|| RestackError::Normalization(format!("SARIF export has no {} run", tool.display_name())))?;
    import_run(&raw.session_id, tool, run)
}

