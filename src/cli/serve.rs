use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::commands::ServeArgs;
use super::{cancel_on_ctrl_c, Context};
use crate::api::{self, AppState};
use crate::errors::RestackError;
use crate::scheduler::ScanScheduler;

pub async fn handle_serve(args: ServeArgs, config_path: Option<&Path>) -> Result<(), RestackError> {
    let ctx = Context::load(config_path).await?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let orchestrator = ctx.orchestrator(cancel.child_token())?;

    let scheduler = if args.no_scheduler {
        None
    } else {
        let scheduler = ScanScheduler::new(
            Arc::new(ctx.db.clone()),
            Arc::new(orchestrator.clone()),
            Duration::from_secs(ctx.config.scheduler.refresh_secs),
        );
        let token = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = scheduler.run(token).await {
                error!(error = %e, "Scheduler stopped with an error");
            }
        }))
    };

    let app = api::build_router(AppState::new(orchestrator));
    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, scheduler = !args.no_scheduler, "Listening");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| RestackError::Internal(format!("Server error: {}", e)))?;

    if let Some(handle) = scheduler {
        let _ = handle.await;
    }
    Ok(())
}
