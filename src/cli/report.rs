use std::path::Path;

use super::commands::ReportArgs;
use super::Context;
use crate::db::PersistenceGateway;
use crate::errors::RestackError;
use crate::models::{Report, SessionId};

pub(crate) async fn load_report(ctx: &Context, id: &str) -> Result<Report, RestackError> {
    ctx.db
        .get_report(&SessionId::from_existing(id))
        .await?
        .ok_or_else(|| RestackError::Config(format!("No report stored for session {}", id)))
}

pub async fn handle_report(args: ReportArgs, config_path: Option<&Path>) -> Result<(), RestackError> {
    let ctx = Context::load(config_path).await?;
    let report = load_report(&ctx, &args.id).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
