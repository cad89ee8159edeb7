//! hrag.toml - application configuration
//!
//! Every section and field is optional; a missing file means all defaults.
//! Environment overrides are applied on top of the file, and command-line
//! flags on top of both (in the binary).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{RagError, Result};
use crate::passage::KeyPolicy;
use crate::retrieval::{FusionConfig, DEFAULT_RRF_K};

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "hrag.toml";

// =============================================================================
// Config Types
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub retrieval: RetrievalSection,
    #[serde(default)]
    pub embeddings: EmbeddingsSection,
    #[serde(default)]
    pub reranker: RerankerSection,
    #[serde(default)]
    pub generator: GeneratorSection,
    #[serde(default)]
    pub ingest: IngestSection,
    #[serde(default)]
    pub eval: EvalSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// Directory holding passages.db and passages.usearch
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".hrag/index")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSection {
    /// Passages returned after fusion
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// RRF damping constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
    #[serde(default = "default_weight")]
    pub weight_dense: f32,
    #[serde(default = "default_weight")]
    pub weight_lexical: f32,
    /// Each retriever fetches top_k * fetch_multiplier candidates before fusion
    #[serde(default = "default_fetch_multiplier")]
    pub fetch_multiplier: usize,
    /// Passage identity used to merge the two lists
    #[serde(default)]
    pub dedup: KeyPolicy,
}

fn default_top_k() -> usize {
    5
}
fn default_rrf_k() -> u32 {
    DEFAULT_RRF_K
}
fn default_weight() -> f32 {
    1.0
}
fn default_fetch_multiplier() -> usize {
    2
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            rrf_k: default_rrf_k(),
            weight_dense: default_weight(),
            weight_lexical: default_weight(),
            fetch_multiplier: default_fetch_multiplier(),
            dedup: KeyPolicy::default(),
        }
    }
}

impl RetrievalSection {
    pub fn fusion_config(&self) -> FusionConfig {
        FusionConfig {
            rrf_k: self.rrf_k,
            weight_dense: self.weight_dense,
            weight_lexical: self.weight_lexical,
            key_policy: self.dedup,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsSection {
    /// Model name; "hash" selects the model-free hashing embedder
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Directory with model.onnx (or model_quantized.onnx) and tokenizer.json
    #[serde(default = "default_embedding_dir")]
    pub model_dir: PathBuf,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_query_prefix")]
    pub query_prefix: Option<String>,
    #[serde(default = "default_passage_prefix")]
    pub passage_prefix: Option<String>,
}

fn default_embedding_model() -> String {
    "e5-small".to_string()
}
fn default_embedding_dir() -> PathBuf {
    PathBuf::from("models/embeddings/e5-small")
}
fn default_dimensions() -> usize {
    384
}
fn default_query_prefix() -> Option<String> {
    Some("query: ".to_string())
}
fn default_passage_prefix() -> Option<String> {
    Some("passage: ".to_string())
}

impl Default for EmbeddingsSection {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            model_dir: default_embedding_dir(),
            dimensions: default_dimensions(),
            query_prefix: default_query_prefix(),
            passage_prefix: default_passage_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cross-encoder directory (model.onnx + tokenizer.json)
    #[serde(default = "default_reranker_dir")]
    pub model_dir: PathBuf,
    /// Passages kept after reranking; falls back to retrieval.top_k
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

fn default_true() -> bool {
    true
}
fn default_reranker_dir() -> PathBuf {
    PathBuf::from("models/reranker/bge-reranker-base")
}
fn default_max_length() -> usize {
    512
}

impl Default for RerankerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            model_dir: default_reranker_dir(),
            top_n: None,
            max_length: default_max_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSection {
    /// Base URL of an OpenAI-compatible server (llama.cpp `llama-server`)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Phrase the model must answer with when the documents lack the answer
    #[serde(default = "default_refusal")]
    pub refusal: String,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8080".to_string()
}
fn default_llm_model() -> String {
    "local".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    256
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_refusal() -> String {
    "Bilmiyorum".to_string()
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            refusal: default_refusal(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSection {
    /// Target chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// File extensions picked up from the document directory
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_chunk_size() -> usize {
    1024
}
fn default_chunk_overlap() -> usize {
    128
}
fn default_extensions() -> Vec<String> {
    vec!["txt".to_string(), "md".to_string()]
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            extensions: default_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSection {
    #[serde(default = "default_questions")]
    pub questions: PathBuf,
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
}

fn default_questions() -> PathBuf {
    PathBuf::from(".hrag/eval/golden_eval_question_set.jsonl")
}
fn default_report_dir() -> PathBuf {
    PathBuf::from(".hrag/eval")
}

impl Default for EvalSection {
    fn default() -> Self {
        Self {
            questions: default_questions(),
            report_dir: default_report_dir(),
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

impl AppConfig {
    /// Load from `path`; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| {
            RagError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Load, apply environment overrides and validate
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `HRAG_*` overrides read through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("HRAG_TOP_K") {
            self.retrieval.top_k = parse_env("HRAG_TOP_K", &value)?;
        }
        if let Some(value) = lookup("HRAG_RRF_K") {
            self.retrieval.rrf_k = parse_env("HRAG_RRF_K", &value)?;
        }
        if let Some(value) = lookup("HRAG_RERANKER_MODEL") {
            self.reranker.model_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("HRAG_LLM_ENDPOINT") {
            self.generator.endpoint = value;
        }
        if let Some(value) = lookup("HRAG_LLM_MODEL") {
            self.generator.model = value;
        }
        if let Some(value) = lookup("HRAG_EVAL_PATH") {
            self.eval.questions = PathBuf::from(value);
        }
        Ok(())
    }

    /// Reject values the retrieval core would refuse at call time
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(RagError::InvalidTopK);
        }
        if self.reranker.top_n == Some(0) {
            return Err(RagError::InvalidTopN);
        }
        if self.retrieval.fetch_multiplier == 0 {
            return Err(RagError::Config(
                "retrieval.fetch_multiplier must be at least 1".to_string(),
            ));
        }
        self.retrieval.fusion_config().validate()?;
        if self.ingest.chunk_size == 0 || self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(RagError::Config(format!(
                "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            )));
        }
        if self.embeddings.dimensions == 0 {
            return Err(RagError::Config(
                "embeddings.dimensions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Passages kept after reranking
    pub fn rerank_top_n(&self) -> usize {
        self.reranker.top_n.unwrap_or(self.retrieval.top_k)
    }

    /// Serialize as TOML (used by `hrag config`)
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RagError::Config(e.to_string()))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RagError::Config(format!("{} has an invalid value: {:?}", key, value)))
}
