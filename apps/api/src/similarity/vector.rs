//! Embedding vectors and the arithmetic the scorer needs on them.

use serde::{Deserialize, Serialize};

use crate::similarity::error::ScoringError;

/// A fixed-length sentence embedding.
///
/// Vectors produced by `TextEmbedder::embed` are unit length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Scales `values` to unit length. Fails on a zero-norm input.
    pub fn normalized(values: Vec<f32>) -> Result<Self, ScoringError> {
        let mut v = Self(values);
        let norm = v.norm();
        if !norm.is_finite() || norm <= f32::EPSILON {
            return Err(ScoringError::DegenerateVector);
        }
        v.0.iter_mut().for_each(|x| *x /= norm);
        Ok(v)
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn norm(&self) -> f32 {
        self.0.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}

/// Cosine of the angle between `a` and `b`, clamped to [-1, 1].
pub fn cosine_similarity(a: &EmbeddingVector, b: &EmbeddingVector) -> Result<f32, ScoringError> {
    if a.dimension() != b.dimension() {
        return Err(ScoringError::DimensionMismatch {
            left: a.dimension(),
            right: b.dimension(),
        });
    }

    let dot: f32 = a
        .as_slice()
        .iter()
        .zip(b.as_slice())
        .map(|(x, y)| x * y)
        .sum();
    let norm_a = a.norm();
    let norm_b = b.norm();

    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return Err(ScoringError::DegenerateVector);
    }

    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Weighted mean of equal-length rows. Weights are token counts, so the
/// result equals the mean over every token in every row.
pub fn weighted_mean(rows: &[Vec<f32>], weights: &[f32]) -> Result<Vec<f32>, ScoringError> {
    let Some(first) = rows.first() else {
        return Err(ScoringError::EmptyInput);
    };
    let dim = first.len();
    let total: f32 = weights.iter().sum();
    if total <= 0.0 {
        return Err(ScoringError::DegenerateVector);
    }

    let mut out = vec![0.0_f32; dim];
    for (row, &w) in rows.iter().zip(weights) {
        if row.len() != dim {
            return Err(ScoringError::DimensionMismatch {
                left: dim,
                right: row.len(),
            });
        }
        for (acc, x) in out.iter_mut().zip(row) {
            *acc += x * w;
        }
    }
    out.iter_mut().for_each(|x| *x /= total);
    Ok(out)
}
