use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns a simple status object with service version.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "similarity-scorer"
    }))
}

/// GET /ready
/// 200 once the embedding model is loaded, 503 before. Never triggers a load.
pub async fn ready_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.scorer.model_name() {
        Some(model) => (
            StatusCode::OK,
            Json(json!({ "status": "ready", "model": model })),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "loading" })),
        ),
    }
}
