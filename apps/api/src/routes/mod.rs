pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::similarity::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/ready", get(health::ready_handler))
        // Similarity API
        .route("/api/v1/similarity/score", post(handlers::handle_score))
        .route("/api/v1/similarity/embed", post(handlers::handle_embed))
        .with_state(state)
}
