//! Error type shared by the retrieval core, storage and generation layers.
//!
//! The binary wraps these in `anyhow` with context; library callers can
//! match on the variants (contract violations in particular are meant to be
//! distinguishable from backend failures).

use thiserror::Error;

/// Errors produced by the hrag library
#[derive(Error, Debug)]
pub enum RagError {
    /// `top_k` of zero passed to a retrieve or fuse call
    #[error("top_k must be at least 1")]
    InvalidTopK,

    /// `top_n` of zero passed to a rerank call
    #[error("top_n must be at least 1")]
    InvalidTopN,

    /// Fusion weight that is negative, NaN or infinite
    #[error("weight for {list} results must be finite and non-negative, got {value}")]
    InvalidWeight { list: &'static str, value: f32 },

    #[error("storage error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("vector index error: {0}")]
    Index(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("reranker error: {0}")]
    Rerank(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("config error: {0}")]
    Config(String),

    /// Unreadable or malformed evaluation question set
    #[error("question set error: {0}")]
    QuestionSet(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, RagError>;
