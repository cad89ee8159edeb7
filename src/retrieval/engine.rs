//! HybridRetriever - parallel dense + lexical retrieval with RRF fusion

use serde::Serialize;
use tracing::{debug, warn};

use super::fusion::{FusionConfig, FusionEngine};
use super::retriever::{ensure_top_k, Retriever};
use crate::error::Result;
use crate::passage::RankedResultSet;

/// Default over-fetch multiplier for fusion
pub const DEFAULT_FETCH_MULTIPLIER: usize = 2;

/// Per-stage results of one hybrid query
#[derive(Debug, Clone, Default, Serialize)]
pub struct HybridResults {
    pub dense: RankedResultSet,
    pub lexical: RankedResultSet,
    pub fused: RankedResultSet,
}

/// Runs both retrievers in parallel and fuses their rankings
pub struct HybridRetriever {
    dense: Box<dyn Retriever>,
    lexical: Box<dyn Retriever>,
    fusion: FusionEngine,
    fetch_multiplier: usize,
}

impl HybridRetriever {
    pub fn new(
        dense: Box<dyn Retriever>,
        lexical: Box<dyn Retriever>,
        config: FusionConfig,
        fetch_multiplier: usize,
    ) -> Result<Self> {
        Ok(Self {
            dense,
            lexical,
            fusion: FusionEngine::new(config)?,
            fetch_multiplier: fetch_multiplier.max(1),
        })
    }

    pub fn fusion_config(&self) -> &FusionConfig {
        self.fusion.config()
    }

    /// Query both sides and keep every intermediate list
    ///
    /// Each side is asked for `top_k * fetch_multiplier` candidates. A side
    /// that is unavailable or fails contributes an empty list.
    pub fn search(&self, query: &str, top_k: usize) -> Result<HybridResults> {
        ensure_top_k(top_k)?;
        let fetch_limit = top_k.saturating_mul(self.fetch_multiplier);

        let (dense, lexical) = rayon::join(
            || run_side(self.dense.as_ref(), query, fetch_limit),
            || run_side(self.lexical.as_ref(), query, fetch_limit),
        );

        let fused = self.fusion.fuse(&dense, &lexical, top_k)?;
        debug!(
            dense = dense.len(),
            lexical = lexical.len(),
            fused = fused.len(),
            top_k,
            "hybrid retrieval"
        );

        Ok(HybridResults {
            dense,
            lexical,
            fused,
        })
    }

    /// Names of the retrievers whose index currently holds passages
    pub fn available_retrievers(&self) -> Vec<&'static str> {
        [self.dense.as_ref(), self.lexical.as_ref()]
            .into_iter()
            .filter(|r| r.is_available())
            .map(|r| r.name())
            .collect()
    }
}

fn run_side(retriever: &dyn Retriever, query: &str, limit: usize) -> RankedResultSet {
    if !retriever.is_available() {
        debug!(retriever = retriever.name(), "retriever unavailable, skipping");
        return RankedResultSet::new();
    }
    match retriever.retrieve(query, limit) {
        Ok(results) => results,
        Err(e) => {
            warn!(retriever = retriever.name(), error = %e, "retriever failed, fusing without it");
            RankedResultSet::new()
        }
    }
}

impl Retriever for HybridRetriever {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn retrieve(&self, query: &str, top_k: usize) -> Result<RankedResultSet> {
        Ok(self.search(query, top_k)?.fused)
    }

    fn is_available(&self) -> bool {
        self.dense.is_available() || self.lexical.is_available()
    }
}
