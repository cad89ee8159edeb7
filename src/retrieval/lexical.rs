//! Lexical retriever - FTS5 BM25 over the passage store
//!
//! Natural-language questions are reduced to their content terms and OR-ed
//! together, since FTS5 defaults to AND and a question rarely shares every
//! word with the passage that answers it.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use super::retriever::{ensure_top_k, Retriever};
use crate::error::Result;
use crate::passage::RankedResultSet;
use crate::storage::PassageStorage;

/// Question words, auxiliaries and particles (Turkish and English)
const STOP_WORDS: &[&str] = &[
    // Turkish
    "acaba", "ama", "ancak", "bana", "beni", "bir", "biz", "bu", "da", "daha", "de", "gibi",
    "hangi", "hangisi", "için", "ile", "ise", "kaç", "kadar", "ki", "mi", "mı", "mu", "mü",
    "midir", "mıdır", "nasıl", "ne", "neden", "nedir", "nelerdir", "nerede", "niçin", "o",
    "olan", "olarak", "olur", "veya", "ve", "ya", "yani", "şu", "var", "varsa",
    // English
    "a", "an", "and", "are", "can", "do", "does", "for", "from", "how", "i", "in", "is",
    "my", "of", "on", "or", "the", "to", "what", "when", "where", "which", "who", "why",
    "with",
];

/// Build an FTS5 MATCH expression from a question
///
/// Terms are quoted so punctuation and FTS5 operators in user input cannot
/// change the query syntax. Returns None when nothing searchable remains.
pub fn prepare_fts_query(query: &str) -> Option<String> {
    let terms = extract_terms(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

/// Lower-cased content terms in first-occurrence order
pub fn extract_terms(query: &str) -> Vec<String> {
    let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    let mut seen = HashSet::new();

    query
        .split(|c: char| !c.is_alphanumeric())
        .map(|word| word.to_lowercase())
        .filter(|word| word.chars().count() >= 2)
        .filter(|word| !stop_words.contains(word.as_str()))
        .filter(|word| seen.insert(word.clone()))
        .collect()
}

/// BM25 retriever backed by the FTS5 table of a `PassageStorage`
pub struct LexicalRetriever {
    storage: Arc<PassageStorage>,
}

impl LexicalRetriever {
    pub fn new(storage: Arc<PassageStorage>) -> Self {
        Self { storage }
    }
}

impl Retriever for LexicalRetriever {
    fn name(&self) -> &'static str {
        "lexical"
    }

    fn retrieve(&self, query: &str, top_k: usize) -> Result<RankedResultSet> {
        ensure_top_k(top_k)?;

        let Some(fts_query) = prepare_fts_query(query) else {
            debug!(query, "no searchable terms, skipping lexical search");
            return Ok(RankedResultSet::new());
        };

        let hits = self.storage.search_lexical(&fts_query, top_k)?;
        debug!(fts_query = %fts_query, hits = hits.len(), "lexical search");

        Ok(RankedResultSet::from_ordered(
            hits.into_iter().map(|(_, passage, score)| (passage, score)),
        ))
    }

    fn is_available(&self) -> bool {
        self.storage.count().map(|n| n > 0).unwrap_or(false)
    }
}
