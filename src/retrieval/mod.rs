//! Retrieval module - hybrid dense + lexical retrieval with RRF fusion
//!
//! Public interface:
//! - `HybridRetriever` runs both retrievers in parallel and fuses them
//! - `FusionEngine` / `FusionConfig` for the rank fusion itself
//! - `Retriever` and `Reranker` traits for pluggable stages
//! - `DenseRetriever`, `LexicalRetriever`, `CrossEncoderReranker`

mod dense;
mod engine;
mod fusion;
mod lexical;
mod rerank;
mod retriever;

pub use dense::DenseRetriever;
pub use engine::{HybridResults, HybridRetriever, DEFAULT_FETCH_MULTIPLIER};
pub use fusion::{
    rrf_fuse, rrf_fuse_weighted, FusionConfig, FusionEngine, WeightedList, DEFAULT_RRF_K,
};
pub use lexical::{extract_terms, prepare_fts_query, LexicalRetriever};
pub use rerank::{order_by_scores, CrossEncoderReranker, Reranker};
pub use retriever::Retriever;
