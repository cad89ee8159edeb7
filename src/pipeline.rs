//! RagPipeline - retrieve, rerank, generate
//!
//! Every collaborator is passed in explicitly. Retrieval errors propagate;
//! reranker and generator failures degrade (fused list, empty answer) and are
//! reported through logs and `AnswerOutcome`.

use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tracing::{debug, error, info, warn};

use crate::error::{RagError, Result};
use crate::generation::Generator;
use crate::passage::RankedResultSet;
use crate::retrieval::{Reranker, Retriever};

/// How an answer was produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "error", rename_all = "snake_case")]
pub enum AnswerOutcome {
    Answered,
    /// Retrieval found nothing; the generator was not called
    NoPassages,
    /// The generator failed; the answer text is empty
    GenerationFailed(String),
}

/// Result of the retrieval half
#[derive(Debug, Clone, Serialize)]
pub struct Retrieved {
    pub passages: RankedResultSet,
    /// False when no reranker is configured or it failed
    pub reranked: bool,
    #[serde(serialize_with = "as_secs")]
    pub latency: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub passages: RankedResultSet,
    /// Distinct passage sources, best-ranked first
    pub citations: Vec<String>,
    pub outcome: AnswerOutcome,
    #[serde(serialize_with = "as_secs")]
    pub retrieval_latency: Duration,
    #[serde(serialize_with = "as_secs")]
    pub generation_latency: Duration,
}

fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Distinct non-empty sources in rank order
pub fn citations(passages: &RankedResultSet) -> Vec<String> {
    let mut seen = Vec::new();
    for source in passages.sources() {
        if !source.is_empty() && !seen.iter().any(|s: &String| s == source) {
            seen.push(source.to_string());
        }
    }
    seen
}

pub struct RagPipeline {
    retriever: Box<dyn Retriever>,
    reranker: Option<Box<dyn Reranker>>,
    generator: Box<dyn Generator>,
    top_k: usize,
    top_n: usize,
}

impl RagPipeline {
    /// `top_k` passages are fused; a reranker keeps `top_n` of them
    pub fn new(
        retriever: Box<dyn Retriever>,
        generator: Box<dyn Generator>,
        top_k: usize,
        top_n: usize,
    ) -> Result<Self> {
        if top_k == 0 {
            return Err(RagError::InvalidTopK);
        }
        if top_n == 0 {
            return Err(RagError::InvalidTopN);
        }
        Ok(Self {
            retriever,
            reranker: None,
            generator,
            top_k,
            top_n,
        })
    }

    pub fn with_reranker(mut self, reranker: Box<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Hybrid retrieval followed by the optional rerank
    pub fn retrieve(&self, query: &str) -> Result<Retrieved> {
        let start = Instant::now();
        let fused = self.retriever.retrieve(query, self.top_k)?;

        let (passages, reranked) = match &self.reranker {
            Some(reranker) if !fused.is_empty() => {
                match reranker.rerank(&fused, query, self.top_n) {
                    Ok(reranked) => (reranked, true),
                    Err(e) => {
                        warn!(reranker = reranker.name(), error = %e, "rerank failed, using fused ranking");
                        (fused, false)
                    }
                }
            }
            _ => (fused, false),
        };

        let latency = start.elapsed();
        debug!(passages = passages.len(), reranked, ?latency, "retrieved");
        Ok(Retrieved {
            passages,
            reranked,
            latency,
        })
    }

    /// Answer with the blocking generator call
    pub fn answer(&self, query: &str) -> Result<Answer> {
        self.run(query, None)
    }

    /// Answer while forwarding generated fragments to `sink`
    ///
    /// If generation fails midway, fragments already passed to `sink` are not
    /// retracted: the outcome is `GenerationFailed` and `text` is empty.
    pub fn answer_streaming(&self, query: &str, sink: &mut dyn FnMut(&str)) -> Result<Answer> {
        self.run(query, Some(sink))
    }

    fn run(&self, query: &str, sink: Option<&mut dyn FnMut(&str)>) -> Result<Answer> {
        let retrieved = self.retrieve(query)?;
        let citations = citations(&retrieved.passages);

        if retrieved.passages.is_empty() {
            warn!(query, "no relevant passages found, skipping generation");
            return Ok(Answer {
                text: String::new(),
                passages: retrieved.passages,
                citations,
                outcome: AnswerOutcome::NoPassages,
                retrieval_latency: retrieved.latency,
                generation_latency: Duration::ZERO,
            });
        }

        let start = Instant::now();
        let result = match sink {
            Some(sink) => self
                .generator
                .generate_stream(query, &retrieved.passages, sink),
            None => self.generator.generate(query, &retrieved.passages),
        };
        let generation_latency = start.elapsed();

        let (text, outcome) = match result {
            Ok(text) => (text, AnswerOutcome::Answered),
            Err(e) => {
                error!(generator = self.generator.name(), error = %e, "generation failed");
                (String::new(), AnswerOutcome::GenerationFailed(e.to_string()))
            }
        };

        info!(
            passages = retrieved.passages.len(),
            retrieval_ms = retrieved.latency.as_millis() as u64,
            generation_ms = generation_latency.as_millis() as u64,
            "answered"
        );

        Ok(Answer {
            text,
            passages: retrieved.passages,
            citations,
            outcome,
            retrieval_latency: retrieved.latency,
            generation_latency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passage::Passage;
    use crate::retrieval::order_by_scores;

    struct FakeRetriever(Vec<(&'static str, &'static str)>);

    impl Retriever for FakeRetriever {
        fn name(&self) -> &'static str {
            "fake"
        }
        fn retrieve(&self, _query: &str, top_k: usize) -> Result<RankedResultSet> {
            if top_k == 0 {
                return Err(RagError::InvalidTopK);
            }
            Ok(RankedResultSet::from_ordered(
                self.0
                    .iter()
                    .take(top_k)
                    .map(|(t, s)| (Passage::new(*t, *s), 1.0)),
            ))
        }
        fn is_available(&self) -> bool {
            true
        }
    }

    /// Reverses the fused order
    struct ReverseReranker;

    impl Reranker for ReverseReranker {
        fn name(&self) -> &str {
            "reverse"
        }
        fn rerank(&self, candidates: &RankedResultSet, _q: &str, top_n: usize) -> Result<RankedResultSet> {
            let scores: Vec<f32> = (0..candidates.len()).map(|i| i as f32).collect();
            order_by_scores(candidates, &scores, top_n)
        }
    }

    struct BrokenReranker;

    impl Reranker for BrokenReranker {
        fn name(&self) -> &str {
            "broken"
        }
        fn rerank(&self, _c: &RankedResultSet, _q: &str, _n: usize) -> Result<RankedResultSet> {
            Err(RagError::Rerank("model not loaded".to_string()))
        }
    }

    struct FakeGenerator {
        fragments: Vec<&'static str>,
        fail: bool,
    }

    impl Generator for FakeGenerator {
        fn name(&self) -> &str {
            "fake"
        }
        fn generate(&self, _query: &str, _passages: &RankedResultSet) -> Result<String> {
            if self.fail {
                return Err(RagError::Generation("connection refused".to_string()));
            }
            Ok(self.fragments.concat())
        }
        fn generate_stream(
            &self,
            query: &str,
            passages: &RankedResultSet,
            sink: &mut dyn FnMut(&str),
        ) -> Result<String> {
            if self.fail {
                return self.generate(query, passages);
            }
            for f in &self.fragments {
                sink(f);
            }
            Ok(self.fragments.concat())
        }
    }

    fn pipeline(items: Vec<(&'static str, &'static str)>, fail: bool) -> RagPipeline {
        RagPipeline::new(
            Box::new(FakeRetriever(items)),
            Box::new(FakeGenerator {
                fragments: vec!["İzin ", "14 ", "gündür."],
                fail,
            }),
            5,
            2,
        )
        .unwrap()
    }

    fn corpus() -> Vec<(&'static str, &'static str)> {
        vec![("A", "izin.md"), ("B", "izin.md"), ("C", "bordro.md")]
    }

    #[test]
    fn test_answer_without_reranker_passes_fused_through() {
        let answer = pipeline(corpus(), false).answer("izin?").unwrap();
        assert_eq!(answer.outcome, AnswerOutcome::Answered);
        assert_eq!(answer.text, "İzin 14 gündür.");
        assert_eq!(answer.passages.len(), 3);
        assert_eq!(answer.citations, vec!["izin.md", "bordro.md"]);
    }

    #[test]
    fn test_reranker_reorders_to_top_n() {
        let pipeline = pipeline(corpus(), false).with_reranker(Box::new(ReverseReranker));
        let retrieved = pipeline.retrieve("izin?").unwrap();
        assert!(retrieved.reranked);
        let texts: Vec<&str> = retrieved.passages.passages().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["C", "B"]);
    }

    #[test]
    fn test_failed_reranker_falls_back_to_fused() {
        let pipeline = pipeline(corpus(), false).with_reranker(Box::new(BrokenReranker));
        let answer = pipeline.answer("izin?").unwrap();
        assert_eq!(answer.outcome, AnswerOutcome::Answered);
        // Unchanged fused list, not cut to top_n
        let texts: Vec<&str> = answer.passages.passages().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_no_passages_skips_generation() {
        let answer = pipeline(vec![], false).answer("izin?").unwrap();
        assert_eq!(answer.outcome, AnswerOutcome::NoPassages);
        assert!(answer.text.is_empty());
        assert_eq!(answer.generation_latency, Duration::ZERO);
    }

    #[test]
    fn test_generation_failure_is_empty_answer() {
        let answer = pipeline(corpus(), true).answer("izin?").unwrap();
        assert!(answer.text.is_empty());
        assert!(matches!(answer.outcome, AnswerOutcome::GenerationFailed(ref e) if e.contains("connection refused")));
        assert_ne!(answer.outcome, AnswerOutcome::NoPassages);
        assert_eq!(answer.passages.len(), 3);
    }

    #[test]
    fn test_streaming_concatenation_equals_answer() {
        let mut streamed = String::new();
        let answer = pipeline(corpus(), false)
            .answer_streaming("izin?", &mut |f| streamed.push_str(f))
            .unwrap();
        assert_eq!(streamed, answer.text);
        assert_eq!(answer.outcome, AnswerOutcome::Answered);
    }

    /// Emits one fragment, then fails
    struct BrokenStreamGenerator;

    impl Generator for BrokenStreamGenerator {
        fn name(&self) -> &str {
            "broken-stream"
        }
        fn generate(&self, _query: &str, _passages: &RankedResultSet) -> Result<String> {
            Err(RagError::Generation("stream closed".to_string()))
        }
        fn generate_stream(
            &self,
            _query: &str,
            _passages: &RankedResultSet,
            sink: &mut dyn FnMut(&str),
        ) -> Result<String> {
            sink("Yıllık ");
            Err(RagError::Generation("stream closed".to_string()))
        }
    }

    #[test]
    fn test_stream_failure_after_fragments() {
        let pipeline = RagPipeline::new(
            Box::new(FakeRetriever(corpus())),
            Box::new(BrokenStreamGenerator),
            5,
            5,
        )
        .unwrap();
        let mut streamed = String::new();
        let answer = pipeline
            .answer_streaming("izin?", &mut |f| streamed.push_str(f))
            .unwrap();

        assert_eq!(streamed, "Yıllık ");
        assert!(answer.text.is_empty());
        assert!(matches!(answer.outcome, AnswerOutcome::GenerationFailed(ref e) if e.contains("stream closed")));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let make = |k, n| {
            RagPipeline::new(
                Box::new(FakeRetriever(vec![])),
                Box::new(FakeGenerator { fragments: vec![], fail: false }),
                k,
                n,
            )
        };
        assert!(matches!(make(0, 1), Err(RagError::InvalidTopK)));
        assert!(matches!(make(1, 0), Err(RagError::InvalidTopN)));
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&AnswerOutcome::GenerationFailed("boom".into())).unwrap();
        assert_eq!(json, r#"{"kind":"generation_failed","error":"boom"}"#);
        let json = serde_json::to_string(&AnswerOutcome::NoPassages).unwrap();
        assert_eq!(json, r#"{"kind":"no_passages"}"#);
    }
}
