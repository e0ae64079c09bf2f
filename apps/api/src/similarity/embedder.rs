//! The seam between the scorer and an embedding backend.
//!
//! `ModelHandle` owns the lazily-loaded backend. It is held by the scorer,
//! not stored in a global, and loads at most once at a time.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::similarity::error::ScoringError;
use crate::similarity::vector::EmbeddingVector;

/// A loaded sentence-embedding model. Read-only once constructed.
pub trait TextEmbedder: Send + Sync {
    fn model_name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Mean-pooled, L2-normalized embedding of `text`. Blocking.
    fn embed(&self, text: &str) -> Result<EmbeddingVector, ScoringError>;
}

/// Produces a `TextEmbedder`. Called by `ModelHandle` on first use.
#[async_trait]
pub trait EmbedderLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn TextEmbedder>, ScoringError>;
}

/// Single-flight, lazily-initialized model slot.
///
/// The load runs in a task owned by the handle, not in the caller's future.
/// A caller that gives up mid-load leaves the load running, and later callers
/// wait on it instead of starting another. A failed load leaves the slot
/// empty, so the next call tries again.
pub struct ModelHandle {
    loader: Arc<dyn EmbedderLoader>,
    slot: Arc<OnceCell<Arc<dyn TextEmbedder>>>,
}

impl ModelHandle {
    pub fn new(loader: impl EmbedderLoader + 'static) -> Self {
        Self {
            loader: Arc::new(loader),
            slot: Arc::new(OnceCell::new()),
        }
    }

    /// Returns the loaded model, loading it first if needed.
    pub async fn get(&self) -> Result<Arc<dyn TextEmbedder>, ScoringError> {
        if let Some(embedder) = self.slot.get() {
            return Ok(Arc::clone(embedder));
        }

        let slot = Arc::clone(&self.slot);
        let loader = Arc::clone(&self.loader);
        tokio::spawn(async move {
            slot.get_or_try_init(|| load_logged(loader.as_ref()))
                .await
                .map(Arc::clone)
        })
        .await
        .map_err(|e| ScoringError::ModelUnavailable(format!("model load task failed: {e}")))?
    }

    /// The model if it has already been loaded. Never triggers a load.
    pub fn loaded(&self) -> Option<&Arc<dyn TextEmbedder>> {
        self.slot.get()
    }
}

async fn load_logged(
    loader: &dyn EmbedderLoader,
) -> Result<Arc<dyn TextEmbedder>, ScoringError> {
    info!("Loading embedding model");
    let loaded = loader.load().await;
    match &loaded {
        Ok(e) => info!(
            model = e.model_name(),
            dimension = e.dimension(),
            "Embedding model ready"
        ),
        Err(e) => warn!("Embedding model failed to load: {e}"),
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::similarity::testing::HashingEmbedder;

    struct CountingLoader {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbedderLoader for CountingLoader {
        async fn load(&self) -> Result<Arc<dyn TextEmbedder>, ScoringError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Arc::new(HashingEmbedder::new(32)))
        }
    }

    struct FailFirstLoader {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbedderLoader for FailFirstLoader {
        async fn load(&self) -> Result<Arc<dyn TextEmbedder>, ScoringError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ScoringError::ModelUnavailable("weights missing".to_string()));
            }
            Ok(Arc::new(HashingEmbedder::new(32)))
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_load_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = Arc::new(ModelHandle::new(CountingLoader {
            calls: Arc::clone(&calls),
        }));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                tokio::spawn(async move { handle.get().await.map(|e| e.dimension()) })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 32);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Blocks a worker thread for the whole load and tracks overlap.
    struct SlowBlockingLoader {
        calls: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbedderLoader for SlowBlockingLoader {
        async fn load(&self) -> Result<Arc<dyn TextEmbedder>, ScoringError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let in_flight = Arc::clone(&self.in_flight);
            tokio::task::spawn_blocking(move || {
                std::thread::sleep(Duration::from_millis(300));
                in_flight.fetch_sub(1, Ordering::SeqCst);
            })
            .await
            .map_err(|e| ScoringError::ModelUnavailable(e.to_string()))?;

            Ok(Arc::new(HashingEmbedder::new(32)))
        }
    }

    #[tokio::test]
    async fn test_abandoned_first_call_does_not_cause_second_load() {
        let calls = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let handle = ModelHandle::new(SlowBlockingLoader {
            calls: Arc::clone(&calls),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::clone(&peak),
        });

        let abandoned = tokio::time::timeout(Duration::from_millis(50), handle.get()).await;
        assert!(abandoned.is_err(), "first call should time out mid-load");

        let embedder = handle.get().await.unwrap();
        assert_eq!(embedder.dimension(), 32);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_loaded_does_not_trigger_load() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = ModelHandle::new(CountingLoader {
            calls: Arc::clone(&calls),
        });

        assert!(handle.loaded().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        handle.get().await.unwrap();
        assert!(handle.loaded().is_some());
    }

    #[tokio::test]
    async fn test_failed_load_is_surfaced_then_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = ModelHandle::new(FailFirstLoader {
            calls: Arc::clone(&calls),
        });

        let first = handle.get().await;
        assert!(matches!(first, Err(ScoringError::ModelUnavailable(_))));
        assert!(handle.loaded().is_none());

        let second = handle.get().await;
        assert!(second.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
