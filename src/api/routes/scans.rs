use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info};

use crate::api::errors::not_found;
use crate::api::models::{CreateScanRequest, ScanAccepted, ScanStatus};
use crate::api::AppState;
use crate::errors::RestackError;
use crate::models::{ScanRequest, SessionId};

/// Validate and allocate synchronously, then scan in the background.
pub async fn create_scan(
    State(state): State<AppState>,
    Json(req): Json<CreateScanRequest>,
) -> Result<Response, RestackError> {
    let request = ScanRequest::from(req);
    let plan = state.orchestrator.prepare(&request)?;

    let accepted = ScanAccepted {
        session_id: plan.session.id.to_string(),
        status: plan.session.status,
        target: plan.session.target.clone(),
        tools: plan.tools(),
    };
    info!(session_id = %accepted.session_id, target = %accepted.target, "Scan accepted");

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        let sid = plan.session.id.clone();
        if let Err(e) = orchestrator.run(plan).await {
            error!(session_id = %sid, error = %e, "Background scan failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(accepted)).into_response())
}

/// Live status for scans started by this process, stored status otherwise.
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, RestackError> {
    let sid = SessionId::from_existing(id.clone());
    if let Some(session) = state.orchestrator.registry().get(&sid) {
        return Ok(Json(ScanStatus { session_id: id, status: session.status }).into_response());
    }
    match state.store.get_report(&sid).await? {
        Some(report) => Ok(Json(ScanStatus { session_id: id, status: report.status }).into_response()),
        None => Ok(not_found("Scan", &id)),
    }
}
