use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{cancel_on_ctrl_c, Context};
use crate::errors::RestackError;

pub async fn handle_update_vulndb(config_path: Option<&Path>) -> Result<(), RestackError> {
    let ctx = Context::load(config_path).await?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let started = std::time::Instant::now();
    ctx.orchestrator(cancel)?.update_vulndb().await?;
    info!(duration_secs = format!("{:.1}", started.elapsed().as_secs_f64()), "search_vulns database is up to date");
    Ok(())
}
