use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::commands::ScheduleArgs;
use super::{cancel_on_ctrl_c, Context};
use crate::db::ScheduleStore;
use crate::errors::RestackError;
use crate::scheduler::ScanScheduler;

pub async fn handle_schedule(args: ScheduleArgs, config_path: Option<&Path>) -> Result<(), RestackError> {
    let ctx = Context::load(config_path).await?;
    let cancel = CancellationToken::new();
    let orchestrator = ctx.orchestrator(cancel.child_token())?;
    let scheduler = ScanScheduler::new(
        Arc::new(ctx.db.clone()),
        Arc::new(orchestrator),
        Duration::from_secs(ctx.config.scheduler.refresh_secs),
    );

    if args.list {
        let summary = scheduler.refresh().await?;
        for job in ctx.db.list_scheduled_jobs().await? {
            let next = scheduler
                .next_fire(&job.id)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".into());
            println!("{:<20} {:<9} {:<40} next: {}", job.id, job.trigger_kind.as_str(), job.target, next);
        }
        if summary.invalid > 0 {
            println!("{} job(s) have an invalid trigger and were skipped", summary.invalid);
        }
        return Ok(());
    }

    cancel_on_ctrl_c(cancel.clone());
    scheduler.run(cancel).await
}
