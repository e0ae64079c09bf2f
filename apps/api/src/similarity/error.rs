use thiserror::Error;

/// Everything that can go wrong between two texts and a score.
///
/// None of these are retried here. A failed call means "score unavailable",
/// never zero.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Input text is empty or whitespace-only")]
    EmptyInput,

    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Embedding dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Cannot compare a zero-norm vector")]
    DegenerateVector,

    #[error("Embedding inference failed: {0}")]
    Inference(String),
}

impl From<candle_core::Error> for ScoringError {
    fn from(e: candle_core::Error) -> Self {
        ScoringError::Inference(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ScoringError {
    fn from(e: tokio::task::JoinError) -> Self {
        ScoringError::Inference(format!("embedding worker failed: {e}"))
    }
}
