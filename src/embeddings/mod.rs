//! Embeddings module - Generate semantic embeddings for text
//!
//! Provides trait-based abstraction for embedding generation with an ONNX
//! backend (E5/MiniLM style sentence encoders) and a model-free hashing
//! backend for tests and offline use.

mod hash;
mod onnx;

pub use hash::HashEmbedder;
pub use onnx::OnnxEmbedder;

use anyhow::Result;

use crate::config::EmbeddingsSection;

/// Model name that selects the hashing embedder
pub const HASH_MODEL: &str = "hash";

/// Trait for embedding generation engines
///
/// Requires Send so an engine can live behind the dense retriever's mutex
/// and be queried from rayon worker threads.
pub trait EmbeddingEngine: Send {
    /// Generate embedding for a single text
    fn embed(&mut self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding for a query text (with model-specific prefix if needed)
    ///
    /// For asymmetric models (e.g., E5), this applies query-specific formatting.
    /// Default implementation calls embed().
    fn embed_query(&mut self, text: &str) -> Result<Vec<f32>> {
        self.embed(text)
    }

    /// Generate embedding for a passage text (with model-specific prefix if needed)
    fn embed_passage(&mut self, text: &str) -> Result<Vec<f32>> {
        self.embed(text)
    }

    /// Generate passage embeddings for multiple texts
    fn embed_passages(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_passage(t)).collect()
    }

    /// Embedding dimension (e.g., 384 for e5-small)
    fn dimension(&self) -> usize;

    /// Model name
    fn model_name(&self) -> &str;
}

/// Create the embedder described by the `[embeddings]` config section
pub fn create_embedder(config: &EmbeddingsSection) -> Result<Box<dyn EmbeddingEngine>> {
    if config.model == HASH_MODEL {
        return Ok(Box::new(HashEmbedder::new(config.dimensions)));
    }

    let model_dir = &config.model_dir;
    let model_path = model_dir.join("model.onnx");
    let tokenizer_path = model_dir.join("tokenizer.json");

    // Try quantized model first (if exists)
    let quantized = model_dir.join("model_quantized.onnx");
    let final_model_path = if quantized.exists() {
        &quantized
    } else {
        &model_path
    };

    Ok(Box::new(OnnxEmbedder::new_from_paths(
        final_model_path,
        &tokenizer_path,
        &config.model,
        config.dimensions,
        config.query_prefix.clone(),
        config.passage_prefix.clone(),
    )?))
}
