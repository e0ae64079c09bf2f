use std::sync::Arc;

use crate::similarity::scorer::SimilarityScorer;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Owns the lazily-loaded embedding model.
    pub scorer: Arc<SimilarityScorer>,
}
