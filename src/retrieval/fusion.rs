//! Reciprocal Rank Fusion (RRF) for combining ranked lists
//!
//! RRF is a simple, effective method for fusing results from multiple retrievers.
//! It only looks at ranks, so dense cosine scores and BM25 scores never have
//! to be put on a common scale.
//! k=60 is the standard value from the original paper (Cormack et al., 2009).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RagError, Result};
use crate::passage::{KeyPolicy, Passage, PassageKey, RankedResultSet};

/// Default RRF smoothing constant
pub const DEFAULT_RRF_K: u32 = 60;

/// Fusion parameters
///
/// Lower `rrf_k` sharpens the preference for top-ranked items. Weights scale
/// each list's contribution without changing the shape of the formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    pub rrf_k: u32,
    pub weight_dense: f32,
    pub weight_lexical: f32,
    pub key_policy: KeyPolicy,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            weight_dense: 1.0,
            weight_lexical: 1.0,
            key_policy: KeyPolicy::default(),
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<()> {
        check_weight("dense", self.weight_dense)?;
        check_weight("lexical", self.weight_lexical)
    }
}

fn check_weight(list: &'static str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(RagError::InvalidWeight { list, value })
    }
}

/// One input list for weighted fusion
#[derive(Debug, Clone, Copy)]
pub struct WeightedList<'a> {
    /// Label used in errors and logs ("dense", "lexical", ...)
    pub name: &'static str,
    pub results: &'a RankedResultSet,
    pub weight: f32,
}

impl<'a> WeightedList<'a> {
    pub fn new(name: &'static str, results: &'a RankedResultSet, weight: f32) -> Self {
        Self {
            name,
            results,
            weight,
        }
    }
}

/// Dense + lexical fusion with fixed configuration
///
/// Holds no per-query state: every call builds and drops its own
/// accumulator, so one engine can serve concurrent queries.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Fuse dense and lexical results into at most `top_k` passages
    ///
    /// On exact score ties dense-list order wins over lexical-list order.
    pub fn fuse(
        &self,
        dense: &RankedResultSet,
        lexical: &RankedResultSet,
        top_k: usize,
    ) -> Result<RankedResultSet> {
        self.fuse_many(
            &[
                WeightedList::new("dense", dense, self.config.weight_dense),
                WeightedList::new("lexical", lexical, self.config.weight_lexical),
            ],
            top_k,
        )
    }

    /// Fuse any number of weighted lists with this engine's `rrf_k` and key policy
    pub fn fuse_many(&self, lists: &[WeightedList<'_>], top_k: usize) -> Result<RankedResultSet> {
        rrf_fuse_weighted(lists, self.config.rrf_k, top_k, self.config.key_policy)
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self {
            config: FusionConfig::default(),
        }
    }
}

/// Reciprocal Rank Fusion with uniform weights and (text, source) identity
pub fn rrf_fuse(lists: &[&RankedResultSet], rrf_k: u32, top_k: usize) -> Result<RankedResultSet> {
    let weighted: Vec<WeightedList<'_>> = lists
        .iter()
        .map(|results| WeightedList::new("list", *results, 1.0))
        .collect();
    rrf_fuse_weighted(&weighted, rrf_k, top_k, KeyPolicy::TextAndSource)
}

/// Weighted Reciprocal Rank Fusion
///
/// Score for passage d = Σ weight_i * 1/(k + rank_i + 1) over every list
/// position where d appears (rank is 0-based). A passage repeated inside one
/// list collects one contribution per occurrence.
pub fn rrf_fuse_weighted(
    lists: &[WeightedList<'_>],
    rrf_k: u32,
    top_k: usize,
    policy: KeyPolicy,
) -> Result<RankedResultSet> {
    if top_k == 0 {
        return Err(RagError::InvalidTopK);
    }
    for list in lists {
        check_weight(list.name, list.weight)?;
    }

    let mut acc = FusionAccumulator::default();
    for list in lists {
        for (rank, scored) in list.results.iter().enumerate() {
            // rank is 0-indexed, so rank 0 -> 1/(k+1)
            let base = 1.0 / (f64::from(rrf_k) + rank as f64 + 1.0);
            acc.add(
                scored.passage.key(policy),
                &scored.passage,
                f64::from(list.weight) * base,
            );
        }
    }

    debug!(
        lists = lists.len(),
        identities = acc.len(),
        rrf_k,
        top_k,
        "rrf fusion"
    );

    Ok(acc.into_ranked(top_k))
}

/// Passage identity -> fused score, in first-insertion order
#[derive(Default)]
struct FusionAccumulator {
    positions: HashMap<PassageKey, usize>,
    entries: Vec<(Passage, f64)>,
}

impl FusionAccumulator {
    fn add(&mut self, key: PassageKey, passage: &Passage, contribution: f64) {
        match self.positions.get(&key) {
            Some(&idx) => {
                let entry = &mut self.entries[idx];
                entry.1 += contribution;
                // Keep the first-seen passage but fill a section it lacked
                if entry.0.section.is_none() && passage.section.is_some() {
                    entry.0.section = passage.section.clone();
                }
            }
            None => {
                self.positions.insert(key, self.entries.len());
                self.entries.push((passage.clone(), contribution));
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn into_ranked(self, top_k: usize) -> RankedResultSet {
        let mut entries = self.entries;
        // Stable sort: equal scores keep insertion order
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        entries.truncate(top_k);
        RankedResultSet::from_ordered(
            entries
                .into_iter()
                .map(|(passage, score)| (passage, score as f32)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn list(items: &[(&str, &str)]) -> RankedResultSet {
        RankedResultSet::from_ordered(
            items
                .iter()
                .enumerate()
                .map(|(i, (text, source))| (Passage::new(*text, *source), 1.0 / (i as f32 + 1.0))),
        )
    }

    fn texts(set: &RankedResultSet) -> Vec<&str> {
        set.iter().map(|s| s.passage.text.as_str()).collect()
    }

    #[test]
    fn test_rrf_single_list() {
        let dense = list(&[("doc_a", "s"), ("doc_b", "s")]);
        let fused = FusionEngine::default()
            .fuse(&dense, &RankedResultSet::new(), 10)
            .unwrap();

        assert_eq!(texts(&fused), vec!["doc_a", "doc_b"]);
        // Rank 0: 1/61, Rank 1: 1/62
        assert_relative_eq!(fused.get(0).unwrap().score, 1.0 / 61.0, epsilon = 1e-6);
        assert_relative_eq!(fused.get(1).unwrap().score, 1.0 / 62.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rrf_scenario_b_a_c() {
        let dense = list(&[("A", "src1"), ("B", "src2")]);
        let lexical = list(&[("B", "src2"), ("C", "src3")]);

        let fused = FusionEngine::default().fuse(&dense, &lexical, 10).unwrap();

        assert_eq!(texts(&fused), vec!["B", "A", "C"]);
        assert_relative_eq!(fused.get(0).unwrap().score, 0.03279, epsilon = 1e-5);
        assert_relative_eq!(fused.get(1).unwrap().score, 0.01639, epsilon = 1e-5);
        assert_relative_eq!(fused.get(2).unwrap().score, 0.01613, epsilon = 1e-5);
        let ranks: Vec<usize> = fused.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[test]
    fn test_rrf_limit() {
        let dense = list(&[("doc_a", "s"), ("doc_b", "s"), ("doc_c", "s")]);
        let fused = FusionEngine::default()
            .fuse(&dense, &RankedResultSet::new(), 2)
            .unwrap();
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_top_k_larger_than_identities_returns_all() {
        let dense = list(&[("a", "s")]);
        let lexical = list(&[("a", "s"), ("b", "s")]);
        let fused = FusionEngine::default().fuse(&dense, &lexical, 50).unwrap();
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_both_empty() {
        let empty = RankedResultSet::new();
        let fused = FusionEngine::default().fuse(&empty, &empty, 5).unwrap();
        assert!(fused.is_empty());
    }

    #[test]
    fn test_dense_empty_uses_lexical_only() {
        let lexical = list(&[
            ("l0", "s"),
            ("l1", "s"),
            ("l2", "s"),
            ("l3", "s"),
            ("l4", "s"),
            ("l5", "s"),
        ]);
        let fused = FusionEngine::default()
            .fuse(&RankedResultSet::new(), &lexical, 5)
            .unwrap();

        assert_eq!(texts(&fused), vec!["l0", "l1", "l2", "l3", "l4"]);
        for (i, s) in fused.iter().enumerate() {
            assert_relative_eq!(s.score, 1.0 / (61.0 + i as f32), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_tie_prefers_dense_order() {
        // X is dense rank 0, Y is lexical rank 0: identical fused scores
        let dense = list(&[("X", "s")]);
        let lexical = list(&[("Y", "s")]);

        let fused = FusionEngine::default().fuse(&dense, &lexical, 5).unwrap();
        assert_eq!(texts(&fused), vec!["X", "Y"]);
        assert_eq!(fused.get(0).unwrap().score, fused.get(1).unwrap().score);
    }

    #[test]
    fn test_same_text_different_source_not_merged() {
        let dense = list(&[("policy", "a.md")]);
        let lexical = list(&[("policy", "b.md")]);

        let fused = FusionEngine::default().fuse(&dense, &lexical, 5).unwrap();
        assert_eq!(fused.len(), 2);
        assert_eq!(fused.sources(), vec!["a.md", "b.md"]);
    }

    #[test]
    fn test_text_only_policy_merges_across_sources() {
        let engine = FusionEngine::new(FusionConfig {
            key_policy: KeyPolicy::TextOnly,
            ..Default::default()
        })
        .unwrap();
        let dense = list(&[("policy", "a.md")]);
        let lexical = list(&[("policy", "b.md")]);

        let fused = engine.fuse(&dense, &lexical, 5).unwrap();
        assert_eq!(fused.len(), 1);
        // First-seen passage is kept
        assert_eq!(fused.get(0).unwrap().passage.source, "a.md");
    }

    #[test]
    fn test_repeated_identity_in_one_list_sums() {
        let dense = list(&[("dup", "s"), ("other", "s"), ("dup", "s")]);
        let fused = FusionEngine::default()
            .fuse(&dense, &RankedResultSet::new(), 5)
            .unwrap();

        assert_eq!(texts(&fused), vec!["dup", "other"]);
        assert_relative_eq!(
            fused.get(0).unwrap().score,
            1.0 / 61.0 + 1.0 / 63.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_missing_source_is_empty_string_identity() {
        let dense = list(&[("orphan", "")]);
        let lexical = list(&[("orphan", "")]);
        let fused = FusionEngine::default().fuse(&dense, &lexical, 5).unwrap();
        assert_eq!(fused.len(), 1);
        assert_eq!(fused.get(0).unwrap().passage.source, "");
    }

    #[test]
    fn test_weight_sensitivity_dense_only_passage() {
        // D only in dense (rank 1), L only in lexical (rank 0)
        let dense = list(&[("shared", "s"), ("D", "s")]);
        let lexical = list(&[("L", "s"), ("shared", "s")]);

        let balanced = FusionEngine::default().fuse(&dense, &lexical, 5).unwrap();
        let pos_balanced = texts(&balanced).iter().position(|t| *t == "D").unwrap();

        let dense_heavy = FusionEngine::new(FusionConfig {
            weight_dense: 2.0,
            ..Default::default()
        })
        .unwrap()
        .fuse(&dense, &lexical, 5)
        .unwrap();
        let pos_heavy = texts(&dense_heavy).iter().position(|t| *t == "D").unwrap();

        assert!(pos_heavy < pos_balanced);
    }

    #[test]
    fn test_custom_rrf_k() {
        let dense = list(&[("a", "s")]);
        let engine = FusionEngine::new(FusionConfig {
            rrf_k: 0,
            ..Default::default()
        })
        .unwrap();
        let fused = engine.fuse(&dense, &RankedResultSet::new(), 1).unwrap();
        assert_relative_eq!(fused.get(0).unwrap().score, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let dense = list(&[("a", "s")]);
        let err = FusionEngine::default()
            .fuse(&dense, &RankedResultSet::new(), 0)
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidTopK));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let err = FusionEngine::new(FusionConfig {
            weight_lexical: -1.0,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, RagError::InvalidWeight { list: "lexical", .. }));

        let err = FusionEngine::new(FusionConfig {
            weight_dense: f32::NAN,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, RagError::InvalidWeight { list: "dense", .. }));
    }

    #[test]
    fn test_fuse_is_deterministic() {
        let dense = list(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]);
        let lexical = list(&[("d", "4"), ("e", "5"), ("a", "1"), ("f", "6")]);
        let engine = FusionEngine::default();

        let first = engine.fuse(&dense, &lexical, 4).unwrap();
        let second = engine.fuse(&dense, &lexical, 4).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rrf_fuse_uniform_three_lists() {
        let a = list(&[("x", "s"), ("y", "s")]);
        let b = list(&[("y", "s")]);
        let c = list(&[("z", "s"), ("y", "s")]);

        let fused = rrf_fuse(&[&a, &b, &c], 60, 10).unwrap();
        assert_eq!(fused.get(0).unwrap().passage.text, "y");
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn test_section_filled_from_later_occurrence() {
        let dense = RankedResultSet::from_ordered(vec![(Passage::new("t", "s"), 0.5)]);
        let lexical = RankedResultSet::from_ordered(vec![(
            Passage::new("t", "s").with_section("3. İzinler"),
            2.0,
        )]);
        let fused = FusionEngine::default().fuse(&dense, &lexical, 5).unwrap();
        assert_eq!(
            fused.get(0).unwrap().passage.section.as_deref(),
            Some("3. İzinler")
        );
    }
}
