//! Axum route handlers for the Similarity API.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::similarity::scorer::SimilarityScore;
use crate::similarity::vector::EmbeddingVector;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub job_text: String,
    pub proposal_text: String,
}

#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub score: SimilarityScore,
    pub cosine_similarity: f32,
    pub model: Option<String>,
    pub scored_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct EmbedResponse {
    pub model: Option<String>,
    pub dimension: usize,
    pub embedding: EmbeddingVector,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/similarity/score
///
/// Scores a proposal against a job description. Returns 0–100.
pub async fn handle_score(
    State(state): State<AppState>,
    Json(request): Json<ScoreRequest>,
) -> Result<Json<ScoreResponse>, AppError> {
    if request.job_text.trim().is_empty() {
        return Err(AppError::Validation("job_text cannot be empty".to_string()));
    }
    if request.proposal_text.trim().is_empty() {
        return Err(AppError::Validation(
            "proposal_text cannot be empty".to_string(),
        ));
    }

    let breakdown = state
        .scorer
        .score_breakdown(&request.job_text, &request.proposal_text)
        .await?;

    Ok(Json(ScoreResponse {
        score: breakdown.score,
        cosine_similarity: breakdown.cosine_similarity,
        model: state.scorer.model_name(),
        scored_at: Utc::now(),
    }))
}

/// POST /api/v1/similarity/embed
///
/// Returns the unit-length embedding for a single text.
pub async fn handle_embed(
    State(state): State<AppState>,
    Json(request): Json<EmbedRequest>,
) -> Result<Json<EmbedResponse>, AppError> {
    if request.text.trim().is_empty() {
        return Err(AppError::Validation("text cannot be empty".to_string()));
    }

    let embedding = state.scorer.embed(&request.text).await?;

    Ok(Json(EmbedResponse {
        model: state.scorer.model_name(),
        dimension: embedding.dimension(),
        embedding,
    }))
}
