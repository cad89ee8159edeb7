//! Dense retriever - embedding similarity over the USearch index

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::retriever::{ensure_top_k, Retriever};
use crate::embeddings::EmbeddingEngine;
use crate::error::{RagError, Result};
use crate::passage::RankedResultSet;
use crate::storage::PassageStorage;

/// Nearest-neighbour retriever
///
/// The embedder needs `&mut self`, so queries through one retriever are
/// serialized on the embedder lock; the vector search itself is lock-free.
pub struct DenseRetriever {
    storage: Arc<PassageStorage>,
    embedder: Mutex<Box<dyn EmbeddingEngine>>,
}

impl DenseRetriever {
    pub fn new(storage: Arc<PassageStorage>, embedder: Box<dyn EmbeddingEngine>) -> Self {
        Self {
            storage,
            embedder: Mutex::new(embedder),
        }
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embedder
            .lock()
            .embed_query(query)
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))
    }
}

impl Retriever for DenseRetriever {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn retrieve(&self, query: &str, top_k: usize) -> Result<RankedResultSet> {
        ensure_top_k(top_k)?;

        if self.storage.vector_count() == 0 {
            debug!("vector index is empty");
            return Ok(RankedResultSet::new());
        }

        let embedding = self.embed_query(query)?;
        let hits = self.storage.search_vectors(&embedding, top_k)?;

        let mut ordered = Vec::with_capacity(hits.len());
        for (rowid, similarity) in hits {
            match self.storage.get(rowid)? {
                Some(passage) => ordered.push((passage, similarity)),
                None => warn!(rowid, "vector has no matching passage row"),
            }
        }
        debug!(hits = ordered.len(), "dense search");

        Ok(RankedResultSet::from_ordered(ordered))
    }

    fn is_available(&self) -> bool {
        self.storage.vector_count() > 0
    }
}
