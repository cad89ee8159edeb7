//! Per-question metrics and aggregation helpers

use crate::passage::RankedResultSet;

/// Whether any retrieved source contains `expected_doc`
///
/// None when the question names no document.
pub fn recall_hit(expected_doc: Option<&str>, sources: &[String]) -> Option<bool> {
    let expected = expected_doc.filter(|d| !d.is_empty())?;
    Some(sources.iter().any(|s| s.contains(expected)))
}

/// Whether any retrieved passage's section heading contains `expected_section`
pub fn section_hit(expected_section: Option<&str>, passages: &RankedResultSet) -> Option<bool> {
    let expected = expected_section.filter(|s| !s.is_empty())?.to_lowercase();
    Some(passages.iter().any(|p| {
        p.passage
            .section
            .as_deref()
            .is_some_and(|s| s.to_lowercase().contains(&expected))
    }))
}

/// 1 / (position of the first source containing `expected_doc`), 0.0 if absent
pub fn reciprocal_rank(expected_doc: Option<&str>, sources: &[String]) -> Option<f64> {
    let expected = expected_doc.filter(|d| !d.is_empty())?;
    Some(
        sources
            .iter()
            .position(|s| s.contains(expected))
            .map(|i| 1.0 / (i + 1) as f64)
            .unwrap_or(0.0),
    )
}

/// Fraction of anchor keywords found in the lower-cased answer
pub fn groundedness(keywords: &[String], answer: &str) -> Option<f64> {
    if keywords.is_empty() {
        return None;
    }
    let answer = answer.to_lowercase();
    let hits = keywords
        .iter()
        .filter(|kw| answer.contains(&kw.to_lowercase()))
        .count();
    Some(hits as f64 / keywords.len() as f64)
}

/// For unanswerable questions: did the answer use the refusal phrase
pub fn unanswerable_correct(answerable: bool, answer: &str, refusal: &str) -> Option<bool> {
    if answerable {
        return None;
    }
    Some(answer.to_lowercase().contains(&refusal.to_lowercase()))
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Fraction of `true` over the defined values, as a percentage
pub fn percent_true(values: impl IntoIterator<Item = Option<bool>>) -> Option<f64> {
    let defined: Vec<f64> = values
        .into_iter()
        .flatten()
        .map(|hit| if hit { 1.0 } else { 0.0 })
        .collect();
    mean(&defined).map(|m| m * 100.0)
}

/// Percentile with linear interpolation between closest ranks
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let position = (sorted.len() - 1) as f64 * (p / 100.0).clamp(0.0, 1.0);
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}
