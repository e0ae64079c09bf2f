use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::similarity::bert::{
    EmbeddingOptions, LongTextPolicy, ModelSource, DEFAULT_MAX_TOKENS, DEFAULT_MODEL_ID,
    DEFAULT_REVISION, MIN_MAX_TOKENS,
};

/// Application configuration loaded from environment variables.
/// Every variable has a default; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub embedding: EmbeddingOptions,
    /// Load the model in the background at startup instead of on first request.
    pub preload_model: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let source = match var("EMBEDDING_MODEL_DIR").filter(|d| !d.trim().is_empty()) {
            Some(dir) => ModelSource::LocalDir(PathBuf::from(dir)),
            None => ModelSource::HuggingFace {
                repo: var("EMBEDDING_MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
                revision: var("EMBEDDING_MODEL_REVISION")
                    .unwrap_or_else(|| DEFAULT_REVISION.to_string()),
            },
        };

        let max_tokens = match var("EMBEDDING_MAX_TOKENS") {
            Some(v) => v
                .parse::<usize>()
                .context("EMBEDDING_MAX_TOKENS must be a positive integer")?,
            None => DEFAULT_MAX_TOKENS,
        };
        if max_tokens < MIN_MAX_TOKENS {
            bail!("EMBEDDING_MAX_TOKENS must be at least {MIN_MAX_TOKENS}, got {max_tokens}");
        }

        let long_text = match var("EMBEDDING_LONG_TEXT") {
            Some(v) => v
                .parse::<LongTextPolicy>()
                .context("EMBEDDING_LONG_TEXT is invalid")?,
            None => LongTextPolicy::default(),
        };

        Ok(Config {
            port: var("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            embedding: EmbeddingOptions {
                source,
                max_tokens,
                long_text,
            },
            preload_model: parse_bool(var("EMBEDDING_PRELOAD").as_deref(), "EMBEDDING_PRELOAD")?,
        })
    }
}

fn parse_bool(value: Option<&str>, key: &str) -> Result<bool> {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => bail!("{key} must be a boolean, got '{other}'"),
    }
}
