//! hrag - hybrid retrieval assistant for HR documents
//!
//! Dense (embedding) and lexical (FTS5 BM25) retrieval over one passage
//! store, fused with Reciprocal Rank Fusion, optionally reranked by a
//! cross-encoder and answered by a local LLM.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod eval;
pub mod generation;
pub mod ingest;
pub mod logging;
pub mod passage;
pub mod pipeline;
pub mod retrieval;
pub mod storage;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{RagError, Result};
pub use passage::{KeyPolicy, Passage, RankedResultSet, ScoredPassage};
pub use pipeline::{Answer, AnswerOutcome, RagPipeline};
pub use retrieval::{FusionConfig, FusionEngine, HybridRetriever};
