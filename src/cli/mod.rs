pub mod commands;
pub mod export;
pub mod replay;
pub mod report;
pub mod scan;
pub mod schedule;
pub mod serve;
pub mod update_vulndb;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapters::HttpZapConnector;
use crate::config::{load_or_default, RestackConfig};
use crate::container::DockerRuntime;
use crate::db::Database;
use crate::errors::RestackError;
use crate::pipeline::ScanOrchestrator;

pub use commands::{Cli, Commands};

/// Everything a command needs after configuration has been loaded.
pub struct Context {
    pub config: RestackConfig,
    pub db: Database,
}

impl Context {
    pub async fn load(config_path: Option<&Path>) -> Result<Self, RestackError> {
        let config = load_or_default(config_path).await?;
        debug!(database = %config.database.path.display(), "Opening database");
        let db = Database::new(&config.database.path)?;
        Ok(Self { config, db })
    }

    /// Orchestrator wired to the local Docker engine and the ZAP REST API.
    pub fn orchestrator(&self, cancel: CancellationToken) -> Result<ScanOrchestrator, RestackError> {
        let runtime = Arc::new(DockerRuntime::connect()?);
        Ok(ScanOrchestrator::new(&self.config, runtime, Arc::new(HttpZapConnector), Arc::new(self.db.clone()))
            .with_cancel_token(cancel))
    }
}

/// Cancel `token` on Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, cancelling running scans");
                token.cancel();
            }
            Err(e) => warn!(error = %e, "Could not install Ctrl-C handler"),
        }
    });
}
