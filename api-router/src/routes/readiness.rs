use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api_state::ApiState;

/// Readiness probe: returns 200 once the database answers and the vector
/// index has been built, else 503.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    let index_ready = state.retriever.is_ready();
    match state.db.query("RETURN true").await {
        Ok(_) if index_ready => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "db": "ok", "index": "ok" }
            })),
        ),
        Ok(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "db": "ok", "index": "building" }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "db": "fail", "index": if index_ready { "ok" } else { "building" } },
                "reason": e.to_string()
            })),
        ),
    }
}
