// Similarity scoring: text -> embedding -> cosine similarity -> percentage.
// The model is owned by `SimilarityScorer` through a lazily-loaded `ModelHandle`.

pub mod bert;
pub mod embedder;
pub mod error;
pub mod handlers;
pub mod scorer;
pub mod vector;
