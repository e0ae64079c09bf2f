mod config;
mod errors;
mod routes;
mod similarity;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::routes::build_router;
use crate::similarity::bert::BertLoader;
use crate::similarity::embedder::ModelHandle;
use crate::similarity::scorer::SimilarityScorer;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting similarity scorer v{}", env!("CARGO_PKG_VERSION"));
    info!(
        source = %config.embedding.source,
        max_tokens = config.embedding.max_tokens,
        long_text = ?config.embedding.long_text,
        "Embedding model configured"
    );

    // The model loads on first use unless preloading is enabled.
    let scorer = Arc::new(SimilarityScorer::new(ModelHandle::new(BertLoader::new(
        config.embedding.clone(),
    ))));

    if config.preload_model {
        let scorer = Arc::clone(&scorer);
        tokio::spawn(async move {
            if let Err(e) = scorer.warm_up().await {
                warn!("Model preload failed, will retry on first request: {e}");
            }
        });
    }

    let state = AppState { scorer };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
