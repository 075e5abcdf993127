use std::path::Path;

use tracing::info;

use super::commands::ExportArgs;
use super::report::load_report;
use super::Context;
use crate::errors::RestackError;
use crate::reporting::to_sarif;

pub async fn handle_export(args: ExportArgs, config_path: Option<&Path>) -> Result<(), RestackError> {
    let ctx = Context::load(config_path).await?;
    let report = load_report(&ctx, &args.id).await?;
    let sarif = serde_json::to_string_pretty(&to_sarif(&report))?;

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, sarif).await?;
            info!(session_id = %report.session_id, path = %path.display(), "SARIF written");
        }
        None => println!("{}", sarif),
    }
    Ok(())
}
