//! Job description vs proposal similarity, as an integer percentage.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::similarity::embedder::ModelHandle;
use crate::similarity::error::ScoringError;
use crate::similarity::vector::{self, EmbeddingVector};

/// Integer percentage in [0, 100].
///
/// Negative cosine similarities floor at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimilarityScore(u8);

impl SimilarityScore {
    pub fn from_similarity(similarity: f32) -> Self {
        let pct = (similarity.clamp(0.0, 1.0) * 100.0).round();
        Self(pct as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

/// A score together with the raw similarity it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub score: SimilarityScore,
    pub cosine_similarity: f32,
}

pub struct SimilarityScorer {
    model: ModelHandle,
}

impl SimilarityScorer {
    pub fn new(model: ModelHandle) -> Self {
        Self { model }
    }

    /// Forces the model load. Used for startup warm-up.
    pub async fn warm_up(&self) -> Result<(), ScoringError> {
        self.model.get().await.map(|_| ())
    }

    /// Name of the loaded model, if it is loaded.
    pub fn model_name(&self) -> Option<String> {
        self.model.loaded().map(|m| m.model_name().to_string())
    }

    /// Unit-length embedding of `text`. Empty input fails before the model
    /// is loaded.
    pub async fn embed(&self, text: &str) -> Result<EmbeddingVector, ScoringError> {
        if text.trim().is_empty() {
            return Err(ScoringError::EmptyInput);
        }

        let embedder = self.model.get().await?;
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || embedder.embed(&text)).await?
    }

    pub fn cosine_similarity(
        a: &EmbeddingVector,
        b: &EmbeddingVector,
    ) -> Result<f32, ScoringError> {
        vector::cosine_similarity(a, b)
    }

    /// Score only. The HTTP handler uses `score_breakdown`.
    #[allow(dead_code)]
    pub async fn score(
        &self,
        job_text: &str,
        proposal_text: &str,
    ) -> Result<SimilarityScore, ScoringError> {
        self.score_breakdown(job_text, proposal_text)
            .await
            .map(|b| b.score)
    }

    pub async fn score_breakdown(
        &self,
        job_text: &str,
        proposal_text: &str,
    ) -> Result<ScoreBreakdown, ScoringError> {
        let (job, proposal) = tokio::try_join!(self.embed(job_text), self.embed(proposal_text))?;

        let cosine_similarity = Self::cosine_similarity(&job, &proposal)?;
        let score = SimilarityScore::from_similarity(cosine_similarity);

        debug!(
            cosine_similarity,
            score = score.value(),
            "Scored proposal against job description"
        );

        Ok(ScoreBreakdown {
            score,
            cosine_similarity,
        })
    }
}
