//! Passage model shared by every retrieval stage
//!
//! A `Passage` is a read-only view of one chunk in the document store.
//! Retrievers, fusion and reranking exchange `RankedResultSet`s: ordered
//! lists of scored passages whose ranks are renumbered at every stage.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Unit of retrievable text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    /// Originating document identifier (empty when unknown)
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl Passage {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            section: None,
        }
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    /// Identity used to collapse the same passage coming from several lists
    pub fn key(&self, policy: KeyPolicy) -> PassageKey {
        match policy {
            KeyPolicy::TextAndSource => PassageKey::Pair {
                text: self.text.clone(),
                source: self.source.clone(),
            },
            KeyPolicy::NormalizedTextAndSource => PassageKey::Pair {
                text: normalize_text(&self.text),
                source: self.source.clone(),
            },
            KeyPolicy::ContentHash => {
                let mut hasher = Sha256::new();
                hasher.update(normalize_text(&self.text).as_bytes());
                // Separator keeps ("ab", "c") and ("a", "bc") apart
                hasher.update([0u8]);
                hasher.update(self.source.as_bytes());
                PassageKey::Hash(hasher.finalize().into())
            }
            KeyPolicy::TextOnly => PassageKey::Text(self.text.clone()),
        }
    }
}

/// Collapse whitespace runs and lower-case
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// How passage identity is computed for deduplication
///
/// Every policy except `TextOnly` keeps passages with different sources
/// distinct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// Literal (text, source) pair
    #[default]
    TextAndSource,
    /// (whitespace-collapsed lower-cased text, source)
    NormalizedTextAndSource,
    /// SHA-256 over normalized text and source
    ContentHash,
    /// Text alone; the same text cited from two documents collapses
    TextOnly,
}

impl KeyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyPolicy::TextAndSource => "text_and_source",
            KeyPolicy::NormalizedTextAndSource => "normalized_text_and_source",
            KeyPolicy::ContentHash => "content_hash",
            KeyPolicy::TextOnly => "text_only",
        }
    }
}

impl fmt::Display for KeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "text_and_source" => Ok(KeyPolicy::TextAndSource),
            "normalized_text_and_source" | "normalized" => Ok(KeyPolicy::NormalizedTextAndSource),
            "content_hash" | "hash" => Ok(KeyPolicy::ContentHash),
            "text_only" | "text" => Ok(KeyPolicy::TextOnly),
            other => Err(format!("unknown dedup policy '{}'", other)),
        }
    }
}

/// Fusion accumulator key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PassageKey {
    Pair { text: String, source: String },
    Text(String),
    Hash([u8; 32]),
}

/// A passage with a stage-specific score and its position in the stage output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPassage {
    #[serde(flatten)]
    pub passage: Passage,
    /// Retriever-, fusion- or reranker-specific; not comparable across stages
    pub score: f32,
    /// 0-based position in the owning result set
    pub rank: usize,
}

/// Ordered result of one retrieval stage (front = most relevant)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RankedResultSet {
    items: Vec<ScoredPassage>,
}

impl RankedResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from passages already in relevance order
    ///
    /// Ranks are assigned from position; negative or NaN scores are raised
    /// to zero so every emitted score is non-negative.
    pub fn from_ordered<I>(items: I) -> Self
    where
        I: IntoIterator<Item = (Passage, f32)>,
    {
        let items = items
            .into_iter()
            .enumerate()
            .map(|(rank, (passage, score))| ScoredPassage {
                passage,
                score: score.max(0.0),
                rank,
            })
            .collect();
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredPassage> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ScoredPassage> {
        self.items.get(index)
    }

    pub fn first(&self) -> Option<&ScoredPassage> {
        self.items.first()
    }

    pub fn passages(&self) -> impl Iterator<Item = &Passage> {
        self.items.iter().map(|s| &s.passage)
    }

    /// Source labels in rank order (used for citations and recall)
    pub fn sources(&self) -> Vec<&str> {
        self.items.iter().map(|s| s.passage.source.as_str()).collect()
    }

    /// Keep the first `len` entries
    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    pub fn into_vec(self) -> Vec<ScoredPassage> {
        self.items
    }
}

impl IntoIterator for RankedResultSet {
    type Item = ScoredPassage;
    type IntoIter = std::vec::IntoIter<ScoredPassage>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a RankedResultSet {
    type Item = &'a ScoredPassage;
    type IntoIter = std::slice::Iter<'a, ScoredPassage>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_text_different_source_distinct() {
        let a = Passage::new("Maaşlar ayın 15'inde yatırılır.", "bordro.md");
        let b = Passage::new("Maaşlar ayın 15'inde yatırılır.", "el_kitabi.md");

        assert_ne!(a.key(KeyPolicy::TextAndSource), b.key(KeyPolicy::TextAndSource));
        assert_ne!(
            a.key(KeyPolicy::NormalizedTextAndSource),
            b.key(KeyPolicy::NormalizedTextAndSource)
        );
        assert_ne!(a.key(KeyPolicy::ContentHash), b.key(KeyPolicy::ContentHash));
        assert_eq!(a.key(KeyPolicy::TextOnly), b.key(KeyPolicy::TextOnly));
    }

    #[test]
    fn test_normalized_policy_ignores_whitespace_and_case() {
        let a = Passage::new("Yıllık  izin\n14 gündür", "izin.md");
        let b = Passage::new("yıllık izin 14 gündür", "izin.md");

        assert_ne!(a.key(KeyPolicy::TextAndSource), b.key(KeyPolicy::TextAndSource));
        assert_eq!(
            a.key(KeyPolicy::NormalizedTextAndSource),
            b.key(KeyPolicy::NormalizedTextAndSource)
        );
        assert_eq!(a.key(KeyPolicy::ContentHash), b.key(KeyPolicy::ContentHash));
    }

    #[test]
    fn test_content_hash_separates_text_and_source() {
        let a = Passage::new("ab", "c");
        let b = Passage::new("a", "bc");
        assert_ne!(a.key(KeyPolicy::ContentHash), b.key(KeyPolicy::ContentHash));
    }

    #[test]
    fn test_from_ordered_assigns_ranks_and_clamps() {
        let set = RankedResultSet::from_ordered(vec![
            (Passage::new("a", "x"), 0.9),
            (Passage::new("b", "x"), -0.2),
            (Passage::new("c", "x"), f32::NAN),
        ]);

        assert_eq!(set.len(), 3);
        let ranks: Vec<usize> = set.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
        assert!(set.iter().all(|s| s.score >= 0.0));
        assert_eq!(set.get(1).map(|s| s.score), Some(0.0));
    }

    #[test]
    fn test_key_policy_parse() {
        assert_eq!("text_and_source".parse::<KeyPolicy>(), Ok(KeyPolicy::TextAndSource));
        assert_eq!("content-hash".parse::<KeyPolicy>(), Ok(KeyPolicy::ContentHash));
        assert_eq!("TEXT_ONLY".parse::<KeyPolicy>(), Ok(KeyPolicy::TextOnly));
        assert!("fuzzy".parse::<KeyPolicy>().is_err());
    }
}
