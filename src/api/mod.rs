pub mod errors;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::db::PersistenceGateway;
use crate::pipeline::ScanOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: ScanOrchestrator,
    pub store: Arc<dyn PersistenceGateway>,
}

impl AppState {
    pub fn new(orchestrator: ScanOrchestrator) -> Self {
        let store = orchestrator.store().clone();
        Self { orchestrator, store }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/api/scans", post(routes::scans::create_scan))
        .route("/api/scans/:id/status", get(routes::scans::get_status))
        .route("/api/reports", get(routes::reports::list_reports))
        .route("/api/reports/period/:period", get(routes::reports::reports_for_period))
        .route("/api/reports/:id", get(routes::reports::get_report))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
