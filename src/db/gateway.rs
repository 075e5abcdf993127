use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use super::Database;
use crate::errors::RestackError;
use crate::models::{Report, ReportSummary, ScheduledJob, SessionId};

/// Write-once report storage and date-range lookups.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Returns `false` if the session was already stored.
    async fn insert_report(&self, report: &Report, artifact: &Path) -> Result<bool, RestackError>;
    async fn get_report(&self, id: &SessionId) -> Result<Option<Report>, RestackError>;
    /// Half-open `[start, end)` on `started_at`.
    async fn reports_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<ReportSummary>, RestackError>;

    async fn reports_in_week(&self, upper: NaiveDate) -> Result<Vec<ReportSummary>, RestackError> {
        let (start, end) = week_range(upper);
        self.reports_between(start, end).await
    }

    async fn reports_in_month(&self, year: i32, month: u32) -> Result<Vec<ReportSummary>, RestackError> {
        let (start, end) = month_range(year, month)?;
        self.reports_between(start, end).await
    }

    async fn reports_in_year(&self, year: i32) -> Result<Vec<ReportSummary>, RestackError> {
        let (start, end) = year_range(year)?;
        self.reports_between(start, end).await
    }
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn list_scheduled_jobs(&self) -> Result<Vec<ScheduledJob>, RestackError>;
    async fn upsert_scheduled_job(&self, job: &ScheduledJob) -> Result<(), RestackError>;
    /// Returns `false` if no job had that id.
    async fn delete_scheduled_job(&self, id: &str) -> Result<bool, RestackError>;
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn invalid_period(what: String) -> RestackError {
    RestackError::Config(format!("Invalid period: {}", what))
}

/// Seven calendar days ending on `upper`, inclusive.
pub fn week_range(upper: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day_start(upper) - Duration::days(6);
    let end = day_start(upper) + Duration::days(1);
    (start, end)
}

pub fn month_range(year: i32, month: u32) -> Result<(DateTime<Utc>, DateTime<Utc>), RestackError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| invalid_period(format!("{}-{:02}", year, month)))?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| invalid_period(format!("{}-{:02}", year, month)))?;
    Ok((day_start(first), day_start(next)))
}

pub fn year_range(year: i32) -> Result<(DateTime<Utc>, DateTime<Utc>), RestackError> {
    let first = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| invalid_period(year.to_string()))?;
    let next = NaiveDate::from_ymd_opt(year + 1, 1, 1).ok_or_else(|| invalid_period(year.to_string()))?;
    Ok((day_start(first), day_start(next)))
}

/// Today's UTC date, the default upper bound for weekly listings.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn current_month() -> (i32, u32) {
    let now = Utc::now();
    (now.year(), now.month())
}

async fn blocking<T, F>(db: &Database, f: F) -> Result<T, RestackError>
where
    T: Send + 'static,
    F: FnOnce(Database) -> Result<T, RestackError> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(db))
        .await
        .map_err(|e| RestackError::Internal(format!("database task panicked: {}", e)))?
}

#[async_trait]
impl PersistenceGateway for Database {
    async fn insert_report(&self, report: &Report, artifact: &Path) -> Result<bool, RestackError> {
        let report = report.clone();
        let artifact: PathBuf = artifact.to_path_buf();
        blocking(self, move |db| db.store_report(&report, &artifact)).await
    }

    async fn get_report(&self, id: &SessionId) -> Result<Option<Report>, RestackError> {
        let id = id.clone();
        blocking(self, move |db| db.load_report(&id)).await
    }

    async fn reports_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<ReportSummary>, RestackError> {
        blocking(self, move |db| db.list_reports_between(&start, &end)).await
    }
}

#[async_trait]
impl ScheduleStore for Database {
    async fn list_scheduled_jobs(&self) -> Result<Vec<ScheduledJob>, RestackError> {
        blocking(self, |db| db.load_scheduled_jobs()).await
    }

    async fn upsert_scheduled_job(&self, job: &ScheduledJob) -> Result<(), RestackError> {
        let job = job.clone();
        blocking(self, move |db| db.save_scheduled_job(&job)).await
    }

    async fn delete_scheduled_job(&self, id: &str) -> Result<bool, RestackError> {
        let id = id.to_string();
        blocking(self, move |db| db.remove_scheduled_job(&id)).await
    }
}
