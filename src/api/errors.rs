use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::errors::RestackError;

impl IntoResponse for RestackError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            RestackError::Config(_) | RestackError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            RestackError::ToolUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": self.to_string(),
            "errorType": self.classify().error_type,
        });
        (status, Json(body)).into_response()
    }
}

pub fn not_found(what: &str, id: &str) -> axum::response::Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": format!("{} {} not found", what, id)}))).into_response()
}
