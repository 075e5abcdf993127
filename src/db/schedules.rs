use chrono::Utc;
use rusqlite::params;

use super::reports::fmt_ts;
use super::Database;
use crate::errors::RestackError;
use crate::models::{ScanOptions, ScheduledJob, TriggerKind};

fn bad_row(id: &str, what: &str, e: impl std::fmt::Display) -> RestackError {
    RestackError::Persistence(format!("Scheduled job '{}' has a corrupt {}: {}", id, what, e))
}

impl Database {
    pub fn load_scheduled_jobs(&self) -> Result<Vec<ScheduledJob>, RestackError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, trigger_kind, trigger_spec, target, config, label FROM scheduled_jobs ORDER BY id",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, String>(5)?,
            ))
        })?;

        let mut jobs = Vec::new();
        for row in rows {
            let (id, kind, spec, target, config, label) = row?;
            let trigger_kind = match kind.as_str() {
                "cron" => TriggerKind::Cron,
                "interval" => TriggerKind::Interval,
                other => return Err(bad_row(&id, "trigger kind", other)),
            };
            let trigger_spec = serde_json::from_str(&spec).map_err(|e| bad_row(&id, "trigger spec", e))?;
            let config: ScanOptions = match config.as_deref() {
                Some(raw) if !raw.trim().is_empty() => {
                    serde_json::from_str(raw).map_err(|e| bad_row(&id, "config", e))?
                }
                _ => ScanOptions::default(),
            };
            jobs.push(ScheduledJob { id, trigger_kind, trigger_spec, target, config, label });
        }
        Ok(jobs)
    }

    pub fn save_scheduled_job(&self, job: &ScheduledJob) -> Result<(), RestackError> {
        let spec = serde_json::to_string(&job.trigger_spec)?;
        let config = serde_json::to_string(&job.config)?;
        self.lock()?.execute(
            "INSERT INTO scheduled_jobs (id, trigger_kind, trigger_spec, target, config, label, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                trigger_kind = excluded.trigger_kind,
                trigger_spec = excluded.trigger_spec,
                target = excluded.target,
                config = excluded.config,
                label = excluded.label,
                updated_at = excluded.updated_at",
            params![job.id, job.trigger_kind.as_str(), spec, job.target, config, job.label, fmt_ts(&Utc::now())],
        )?;
        Ok(())
    }

    /// Returns `false` if no job had that id.
    pub fn remove_scheduled_job(&self, id: &str) -> Result<bool, RestackError> {
        let n = self.lock()?.execute("DELETE FROM scheduled_jobs WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }
}
