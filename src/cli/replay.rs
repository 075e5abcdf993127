use std::path::Path;

use tokio_util::sync::CancellationToken;

use super::commands::ReplayArgs;
use super::Context;
use crate::errors::RestackError;
use crate::models::SessionId;

pub async fn handle_replay(args: ReplayArgs, config_path: Option<&Path>) -> Result<(), RestackError> {
    let ctx = Context::load(config_path).await?;
    let session = match &args.session {
        Some(s) => s.clone(),
        None => args
            .artifact
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .ok_or_else(|| RestackError::Config(format!("Cannot derive a session id from {}", args.artifact.display())))?,
    };

    let orchestrator = ctx.orchestrator(CancellationToken::new())?;
    let output = orchestrator
        .replay(args.tool, &args.artifact, &SessionId::from_existing(session))
        .await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
