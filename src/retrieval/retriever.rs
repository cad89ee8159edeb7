//! Retriever trait - one ranked view over the passage store
//!
//! Dense and lexical retrievers are internal retrieval strategies over the
//! same `PassageStorage`. Each returns at most `top_k` passages, most
//! relevant first, and is deterministic for a fixed query and index state.

use crate::error::{RagError, Result};
use crate::passage::RankedResultSet;

/// Retrieval strategy interface
///
/// Requires Send + Sync so the hybrid retriever can query both sides in
/// parallel and callers can share one retriever across threads.
pub trait Retriever: Send + Sync {
    /// Name for provenance and logs
    fn name(&self) -> &'static str;

    /// Return up to `top_k` passages in descending relevance
    ///
    /// An empty or missing index yields an empty set, not an error.
    fn retrieve(&self, query: &str, top_k: usize) -> Result<RankedResultSet>;

    /// Whether the backing index exists and holds passages
    fn is_available(&self) -> bool;
}

/// Reject `top_k == 0` at the retrieve boundary
pub(crate) fn ensure_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        Err(RagError::InvalidTopK)
    } else {
        Ok(())
    }
}
