//! CLI commands
//!
//! Each command builds its collaborators explicitly from the resolved
//! `AppConfig`; nothing is initialised at process start.

pub mod ask;
pub mod eval;
pub mod ingest;
pub mod search;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use hrag::config::AppConfig;
use hrag::embeddings::{create_embedder, EmbeddingEngine};
use hrag::generation::LlamaServerGenerator;
use hrag::retrieval::{
    CrossEncoderReranker, DenseRetriever, HybridRetriever, LexicalRetriever, Reranker,
};
use hrag::storage::PassageStorage;
use hrag::RagPipeline;

/// Read the config file and apply environment overrides
pub fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::resolve(path).with_context(|| format!("Failed to load config: {}", path.display()))
}

pub fn apply_top_k(config: &mut AppConfig, top_k: Option<usize>) {
    if let Some(k) = top_k {
        config.retrieval.top_k = k;
    }
}

pub fn open_embedder(config: &AppConfig) -> Result<Box<dyn EmbeddingEngine>> {
    create_embedder(&config.embeddings).with_context(|| {
        format!(
            "Failed to load embedding model '{}' from {}",
            config.embeddings.model,
            config.embeddings.model_dir.display()
        )
    })
}

pub fn open_storage(config: &AppConfig) -> Result<Arc<PassageStorage>> {
    let storage = PassageStorage::open(&config.store.dir, config.embeddings.dimensions)
        .with_context(|| format!("Failed to open index at {}", config.store.dir.display()))?;
    Ok(Arc::new(storage))
}

/// Cross-encoder if enabled and loadable; a load failure only disables reranking
pub fn build_reranker(config: &AppConfig, no_rerank: bool) -> Option<Box<dyn Reranker>> {
    if no_rerank || !config.reranker.enabled {
        return None;
    }
    match CrossEncoderReranker::from_dir(&config.reranker.model_dir, config.reranker.max_length) {
        Ok(reranker) => Some(Box::new(reranker)),
        Err(e) => {
            warn!(error = %e, "reranker unavailable, using fused ranking");
            None
        }
    }
}

/// Store, retrievers, reranker and generator wired from `config`
pub fn build_pipeline(config: &AppConfig, no_rerank: bool) -> Result<RagPipeline> {
    config.validate().context("Invalid configuration")?;

    let storage = open_storage(config)?;
    if storage.count()? == 0 {
        warn!(dir = %config.store.dir.display(), "index is empty, run `hrag ingest` first");
    }
    let embedder = open_embedder(config)?;

    let hybrid = HybridRetriever::new(
        Box::new(DenseRetriever::new(Arc::clone(&storage), embedder)),
        Box::new(LexicalRetriever::new(storage)),
        config.retrieval.fusion_config(),
        config.retrieval.fetch_multiplier,
    )?;
    let generator = LlamaServerGenerator::new(&config.generator)?;

    let pipeline = RagPipeline::new(
        Box::new(hybrid),
        Box::new(generator),
        config.retrieval.top_k,
        config.rerank_top_n(),
    )?;

    Ok(match build_reranker(config, no_rerank) {
        Some(reranker) => pipeline.with_reranker(reranker),
        None => pipeline,
    })
}

/// Shorten for single-line display
pub fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        format!("{}…", flat.chars().take(max_chars).collect::<String>())
    }
}
