//! Reranking - second-stage relevance scoring of the fused candidates
//!
//! The pipeline holds an `Option<Box<dyn Reranker>>`; with no reranker (or
//! when one fails) the fused list is passed through unchanged.

use std::fmt::Display;
use std::path::Path;

use ndarray::Array2;
use ort::{inputs, session::Session, value::Value};
use parking_lot::Mutex;
use tokenizers::Tokenizer;
use tracing::debug;

use crate::error::{RagError, Result};
use crate::passage::{Passage, RankedResultSet};

/// Second-stage scorer over a candidate set
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// Re-score `candidates` against `query` and keep the best `top_n`
    ///
    /// The output is a subset of the input, ordered by the reranker's own
    /// score, with ranks renumbered from 0.
    fn rerank(
        &self,
        candidates: &RankedResultSet,
        query: &str,
        top_n: usize,
    ) -> Result<RankedResultSet>;
}

/// Reorder `candidates` by `scores` (parallel to the candidate order)
///
/// Equal scores keep the incoming (fused) order.
pub fn order_by_scores(
    candidates: &RankedResultSet,
    scores: &[f32],
    top_n: usize,
) -> Result<RankedResultSet> {
    if top_n == 0 {
        return Err(RagError::InvalidTopN);
    }
    if scores.len() != candidates.len() {
        return Err(RagError::Rerank(format!(
            "got {} scores for {} candidates",
            scores.len(),
            candidates.len()
        )));
    }

    let mut scored: Vec<(&Passage, f32)> = candidates
        .passages()
        .zip(scores.iter().copied())
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_n);

    Ok(RankedResultSet::from_ordered(
        scored.into_iter().map(|(p, s)| (p.clone(), s)),
    ))
}

fn model_err(e: impl Display) -> RagError {
    RagError::Rerank(e.to_string())
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Cross-encoder reranker (bge-reranker style) on ONNX Runtime
///
/// Scores are sigmoid(logit), so they fall in [0, 1].
pub struct CrossEncoderReranker {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    uses_token_type_ids: bool,
    name: String,
}

impl CrossEncoderReranker {
    /// Load `model.onnx` and `tokenizer.json` from `model_dir`
    pub fn from_dir(model_dir: &Path, max_length: usize) -> Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        if !model_path.exists() {
            return Err(RagError::Rerank(format!(
                "reranker model not found at {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(model_err)?
            .commit_from_file(&model_path)
            .map_err(model_err)?;
        let uses_token_type_ids = session.inputs.iter().any(|i| i.name == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(model_err)?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(model_err)?;

        let name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cross-encoder".to_string());

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            uses_token_type_ids,
            name,
        })
    }

    fn score_pair(&self, query: &str, text: &str) -> Result<f32> {
        let encoding = self
            .tokenizer
            .encode((query, text), true)
            .map_err(model_err)?;

        let len = encoding.get_ids().len();
        let to_array = |values: &[u32]| {
            Array2::from_shape_vec((1, len), values.iter().map(|&v| v as i64).collect())
                .map_err(model_err)
        };
        let input_ids = Value::from_array(to_array(encoding.get_ids())?).map_err(model_err)?;
        let attention_mask =
            Value::from_array(to_array(encoding.get_attention_mask())?).map_err(model_err)?;

        let mut session = self.session.lock();
        let outputs = if self.uses_token_type_ids {
            let token_type_ids =
                Value::from_array(to_array(encoding.get_type_ids())?).map_err(model_err)?;
            session.run(inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids
            ])
        } else {
            session.run(inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask
            ])
        }
        .map_err(model_err)?;

        let (_, logits) = outputs["logits"]
            .try_extract_tensor::<f32>()
            .map_err(model_err)?;
        let logit = logits
            .first()
            .copied()
            .ok_or_else(|| RagError::Rerank("empty logits output".to_string()))?;

        Ok(sigmoid(logit))
    }
}

impl Reranker for CrossEncoderReranker {
    fn name(&self) -> &str {
        &self.name
    }

    fn rerank(
        &self,
        candidates: &RankedResultSet,
        query: &str,
        top_n: usize,
    ) -> Result<RankedResultSet> {
        if top_n == 0 {
            return Err(RagError::InvalidTopN);
        }
        let scores = candidates
            .passages()
            .map(|p| self.score_pair(query, &p.text))
            .collect::<Result<Vec<_>>>()?;
        debug!(candidates = candidates.len(), top_n, "cross-encoder rerank");

        order_by_scores(candidates, &scores, top_n)
    }
}
