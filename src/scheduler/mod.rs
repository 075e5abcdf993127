//! Replays stored scan definitions on cron or interval triggers.

pub mod trigger;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::ScheduleStore;
use crate::errors::RestackError;
use crate::models::{ScanRequest, ScheduledJob};
use crate::pipeline::ScanExecutor;

pub use trigger::{CronSchedule, Trigger};

/// Upper bound on a single sleep of the run loop.
const MAX_IDLE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub added: usize,
    pub replaced: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub invalid: usize,
}

impl RefreshSummary {
    pub fn changed(&self) -> bool {
        self.added + self.replaced + self.removed + self.invalid > 0
    }
}

struct LiveJob {
    job: ScheduledJob,
    trigger: Trigger,
    next_fire: Option<DateTime<Utc>>,
}

pub struct ScanScheduler {
    store: Arc<dyn ScheduleStore>,
    executor: Arc<dyn ScanExecutor>,
    refresh_every: Duration,
    jobs: Mutex<HashMap<String, LiveJob>>,
}

impl ScanScheduler {
    pub fn new(store: Arc<dyn ScheduleStore>, executor: Arc<dyn ScanExecutor>, refresh_every: Duration) -> Self {
        Self {
            store,
            executor,
            refresh_every,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, LiveJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    pub fn trigger_for(&self, id: &str) -> Option<Trigger> {
        self.table().get(id).map(|j| j.trigger.clone())
    }

    pub fn next_fire(&self, id: &str) -> Option<DateTime<Utc>> {
        self.table().get(id).and_then(|j| j.next_fire)
    }

    /// Reconcile the live table with storage. A job whose trigger is
    /// unchanged keeps its schedule; a changed trigger replaces the job.
    pub async fn refresh(&self) -> Result<RefreshSummary, RestackError> {
        let stored = self.store.list_scheduled_jobs().await?;
        let now = Utc::now();
        let mut summary = RefreshSummary::default();
        let mut table = self.table();

        let stored_ids: std::collections::HashSet<&str> = stored.iter().map(|j| j.id.as_str()).collect();
        let before = table.len();
        table.retain(|id, _| stored_ids.contains(id.as_str()));
        summary.removed = before - table.len();

        for job in &stored {
            let trigger = match Trigger::parse(job.trigger_kind, &job.trigger_spec) {
                Ok(t) => t,
                Err(e) => {
                    warn!(job_id = %job.id, label = %job.label, error = %e, "Skipping scheduled job with an invalid trigger");
                    summary.invalid += 1;
                    continue;
                }
            };

            match table.get_mut(&job.id) {
                Some(live) if live.trigger == trigger => {
                    live.job = job.clone();
                    summary.unchanged += 1;
                }
                Some(live) => {
                    info!(job_id = %job.id, label = %job.label, "Trigger changed, replacing scheduled job");
                    live.next_fire = trigger.next_after(now);
                    live.trigger = trigger;
                    live.job = job.clone();
                    summary.replaced += 1;
                }
                None => {
                    let next_fire = trigger.next_after(now);
                    debug!(job_id = %job.id, label = %job.label, next_fire = ?next_fire, "Scheduling job");
                    table.insert(job.id.clone(), LiveJob { job: job.clone(), trigger, next_fire });
                    summary.added += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Launch every job due at `now` in the background and advance its
    /// trigger. Runs of the same job may overlap.
    pub fn fire_due(&self, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        let mut due = Vec::new();
        for live in self.table().values_mut() {
            if live.next_fire.is_some_and(|at| at <= now) {
                live.next_fire = live.trigger.next_after(now);
                due.push(live.job.clone());
            }
        }
        due.into_iter().map(|job| self.launch(job)).collect()
    }

    fn launch(&self, job: ScheduledJob) -> JoinHandle<()> {
        let executor = self.executor.clone();
        info!(job_id = %job.id, label = %job.label, target = %job.target, "Firing scheduled scan");
        tokio::spawn(async move {
            let request = ScanRequest::from_options(job.target.clone(), &job.config);
            match executor.execute(request).await {
                Ok(report) => info!(
                    job_id = %job.id,
                    session_id = %report.session_id,
                    total_findings = report.total_findings,
                    "Scheduled scan finished"
                ),
                Err(e) if e.is_request_fatal() => error!(
                    job_id = %job.id,
                    error_type = e.classify().error_type,
                    error = %e,
                    "Scheduled scan rejected, the job definition needs fixing"
                ),
                Err(e) => warn!(job_id = %job.id, error = %e, "Scheduled scan failed"),
            }
        })
    }

    fn until_next_fire(&self, now: DateTime<Utc>) -> Duration {
        self.table()
            .values()
            .filter_map(|j| j.next_fire)
            .min()
            .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(MAX_IDLE)
            .min(MAX_IDLE)
    }

    /// Load jobs, then fire and refresh until `cancel` fires. Only the
    /// initial load can fail; later refresh errors are logged.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), RestackError> {
        let summary = self.refresh().await?;
        info!(jobs = self.len(), invalid = summary.invalid, "Scheduler started");
        let mut next_refresh = tokio::time::Instant::now() + self.refresh_every;

        loop {
            self.fire_due(Utc::now());

            if tokio::time::Instant::now() >= next_refresh {
                match self.refresh().await {
                    Ok(s) if s.changed() => {
                        info!(added = s.added, replaced = s.replaced, removed = s.removed, invalid = s.invalid, "Scheduled jobs refreshed");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Failed to refresh scheduled jobs"),
                }
                next_refresh = tokio::time::Instant::now() + self.refresh_every;
            }

            let wait = self
                .until_next_fire(Utc::now())
                .min(next_refresh.saturating_duration_since(tokio::time::Instant::now()));
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait.max(Duration::from_millis(50))) => {}
            }
        }
        info!("Scheduler stopped");
        Ok(())
    }
}
