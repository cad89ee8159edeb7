//! Evaluation harness
//!
//! Runs a labeled question set through the pipeline and measures recall,
//! MRR, latency, groundedness (a hallucination proxy) and how often
//! unanswerable questions are correctly refused.

mod metrics;
mod questions;

pub use metrics::{
    groundedness, mean, percent_true, percentile, recall_hit, reciprocal_rank, section_hit,
    unanswerable_correct,
};
pub use questions::{parse_anchor_keywords, EvalQuestion, QuestionSet};

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::passage::KeyPolicy;
use crate::pipeline::{AnswerOutcome, RagPipeline};

pub const RESULTS_FILE: &str = "eval_results.jsonl";
pub const SUMMARY_FILE: &str = "eval_summary.json";

/// Settings recorded alongside the summary
#[derive(Debug, Clone, Serialize)]
pub struct EvalSettings {
    pub top_k: usize,
    pub rrf_k: u32,
    pub weight_dense: f32,
    pub weight_lexical: f32,
    pub dedup: KeyPolicy,
    pub reranker: Option<String>,
    pub embedding_model: String,
    pub llm_model: String,
    /// Phrase counted as a correct refusal
    pub refusal: String,
    /// Skip generation; answer metrics become None
    pub retrieval_only: bool,
}

/// One evaluated question
#[derive(Debug, Clone, Serialize)]
pub struct QuestionRecord {
    pub question: String,
    pub expected_doc: Option<String>,
    pub expected_section: Option<String>,
    pub answerable: bool,
    pub retrieved_docs: Vec<String>,
    pub recall_hit: Option<bool>,
    pub section_hit: Option<bool>,
    pub reciprocal_rank: Option<f64>,
    pub groundedness: Option<f64>,
    pub unanswerable_correct: Option<bool>,
    /// Retrieval + generation, seconds
    pub latency: f64,
    pub retrieval_latency: f64,
    pub answer: String,
    /// None in retrieval-only runs
    pub outcome: Option<AnswerOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalSummary {
    pub questions: usize,
    pub recall_at_k: Option<f64>,
    pub section_recall: Option<f64>,
    pub mrr: Option<f64>,
    pub avg_latency: f64,
    pub p50_latency: f64,
    pub p95_latency: f64,
    pub hallucination_rate: Option<f64>,
    pub unanswerable_accuracy: Option<f64>,
    pub generation_failures: usize,
    pub no_passage_answers: usize,
    pub generated_at: String,
    pub settings: EvalSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub records: Vec<QuestionRecord>,
    pub summary: EvalSummary,
}

/// Evaluate a single question
pub fn evaluate_question(
    pipeline: &RagPipeline,
    question: &EvalQuestion,
    settings: &EvalSettings,
) -> Result<QuestionRecord> {
    let (passages, answer, outcome, retrieval_latency, generation_latency) =
        if settings.retrieval_only {
            let retrieved = pipeline.retrieve(&question.question)?;
            (retrieved.passages, None, None, retrieved.latency, None)
        } else {
            let answer = pipeline.answer(&question.question)?;
            (
                answer.passages,
                Some(answer.text),
                Some(answer.outcome),
                answer.retrieval_latency,
                Some(answer.generation_latency),
            )
        };

    let retrieved_docs: Vec<String> = passages.sources().into_iter().map(str::to_string).collect();
    let expected_doc = question.expected_doc.as_deref();

    let (groundedness, unanswerable_correct) = match &answer {
        Some(text) => (
            metrics::groundedness(&question.keywords(), text),
            metrics::unanswerable_correct(question.answerable, text, &settings.refusal),
        ),
        None => (None, None),
    };

    let latency = retrieval_latency + generation_latency.unwrap_or_default();

    Ok(QuestionRecord {
        question: question.question.clone(),
        expected_doc: question.expected_doc.clone(),
        expected_section: question.expected_section.clone(),
        answerable: question.answerable,
        recall_hit: metrics::recall_hit(expected_doc, &retrieved_docs),
        section_hit: metrics::section_hit(question.expected_section.as_deref(), &passages),
        reciprocal_rank: metrics::reciprocal_rank(expected_doc, &retrieved_docs),
        retrieved_docs,
        groundedness,
        unanswerable_correct,
        latency: latency.as_secs_f64(),
        retrieval_latency: retrieval_latency.as_secs_f64(),
        answer: answer.unwrap_or_default(),
        outcome,
    })
}

/// Evaluate every question, calling `on_record` after each one
pub fn run_eval(
    pipeline: &RagPipeline,
    questions: &QuestionSet,
    settings: &EvalSettings,
    on_record: &mut dyn FnMut(usize, &QuestionRecord),
) -> Result<EvalReport> {
    let mut records = Vec::with_capacity(questions.len());
    for (i, question) in questions.questions.iter().enumerate() {
        let record = evaluate_question(pipeline, question, settings)?;
        debug!(
            index = i + 1,
            recall_hit = ?record.recall_hit,
            latency = record.latency,
            "evaluated question"
        );
        on_record(i, &record);
        records.push(record);
    }

    let summary = summarize(&records, settings.clone());
    info!(
        questions = summary.questions,
        recall = ?summary.recall_at_k,
        mrr = ?summary.mrr,
        "evaluation complete"
    );
    Ok(EvalReport { records, summary })
}

/// Aggregate metrics over the per-question records
pub fn summarize(records: &[QuestionRecord], settings: EvalSettings) -> EvalSummary {
    let latencies: Vec<f64> = records.iter().map(|r| r.latency).collect();
    let reciprocal_ranks: Vec<f64> = records.iter().filter_map(|r| r.reciprocal_rank).collect();
    let grounded: Vec<f64> = records.iter().filter_map(|r| r.groundedness).collect();

    EvalSummary {
        questions: records.len(),
        recall_at_k: percent_true(records.iter().map(|r| r.recall_hit)),
        section_recall: percent_true(records.iter().map(|r| r.section_hit)),
        mrr: mean(&reciprocal_ranks),
        avg_latency: mean(&latencies).unwrap_or(0.0),
        p50_latency: percentile(&latencies, 50.0),
        p95_latency: percentile(&latencies, 95.0),
        hallucination_rate: mean(&grounded).map(|g| (1.0 - g) * 100.0),
        unanswerable_accuracy: percent_true(records.iter().map(|r| r.unanswerable_correct)),
        generation_failures: records
            .iter()
            .filter(|r| matches!(r.outcome, Some(AnswerOutcome::GenerationFailed(_))))
            .count(),
        no_passage_answers: records
            .iter()
            .filter(|r| matches!(r.outcome, Some(AnswerOutcome::NoPassages)))
            .count(),
        generated_at: Utc::now().to_rfc3339(),
        settings,
    }
}

impl EvalReport {
    /// Write `eval_results.jsonl` and `eval_summary.json` into `dir`
    pub fn write(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(dir)?;

        let results_path = dir.join(RESULTS_FILE);
        let mut writer = BufWriter::new(File::create(&results_path)?);
        for record in &self.records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        let summary_path = dir.join(SUMMARY_FILE);
        fs::write(&summary_path, serde_json::to_string_pretty(&self.summary)?)?;

        info!(dir = %dir.display(), records = self.records.len(), "wrote evaluation report");
        Ok((results_path, summary_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::generation::Generator;
    use crate::passage::{Passage, RankedResultSet};
    use crate::retrieval::Retriever;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    struct FakeRetriever;

    impl Retriever for FakeRetriever {
        fn name(&self) -> &'static str {
            "fake"
        }
        fn retrieve(&self, query: &str, _top_k: usize) -> crate::Result<RankedResultSet> {
            if query.contains("CEO") {
                return Ok(RankedResultSet::new());
            }
            Ok(RankedResultSet::from_ordered(vec![
                (Passage::new("Maaş ayın 15'inde yatar.", "bordro.md"), 0.9),
                (
                    Passage::new("Yıllık izin 14 gündür.", "izin.md").with_section("Yıllık İzin"),
                    0.8,
                ),
            ]))
        }
        fn is_available(&self) -> bool {
            true
        }
    }

    /// Answers from the first passage, refuses on "bilinmez"
    struct FakeGenerator;

    impl Generator for FakeGenerator {
        fn name(&self) -> &str {
            "fake"
        }
        fn generate(&self, query: &str, passages: &RankedResultSet) -> crate::Result<String> {
            if query.contains("bilinmez") {
                return Ok("Bilmiyorum.".to_string());
            }
            if query.contains("hata") {
                return Err(RagError::Generation("timeout".to_string()));
            }
            Ok(passages.get(1).map(|p| p.passage.text.clone()).unwrap_or_default())
        }
    }

    fn pipeline() -> RagPipeline {
        RagPipeline::new(Box::new(FakeRetriever), Box::new(FakeGenerator), 5, 5).unwrap()
    }

    fn settings(retrieval_only: bool) -> EvalSettings {
        EvalSettings {
            top_k: 5,
            rrf_k: 60,
            weight_dense: 1.0,
            weight_lexical: 1.0,
            dedup: KeyPolicy::TextAndSource,
            reranker: None,
            embedding_model: "hash".to_string(),
            llm_model: "fake".to_string(),
            refusal: "Bilmiyorum".to_string(),
            retrieval_only,
        }
    }

    fn questions() -> QuestionSet {
        QuestionSet::parse(
            r#"{"question": "İzin kaç gün?", "expected_doc": "izin.md", "expected_section": "Yıllık İzin", "anchor_keywords": "14, gün"}
{"question": "Kıdem tazminatı?", "expected_doc": "kidem.md", "anchor_keywords": "kıdem"}
{"question": "bilinmez bir soru", "answerable": false}
{"question": "CEO maaşı", "answerable": false}
{"question": "hata veren soru"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_run_eval_aggregates() {
        let mut seen = 0;
        let report = run_eval(&pipeline(), &questions(), &settings(false), &mut |_, _| {
            seen += 1
        })
        .unwrap();
        assert_eq!(seen, 5);

        let first = &report.records[0];
        assert_eq!(first.recall_hit, Some(true));
        assert_eq!(first.section_hit, Some(true));
        assert_relative_eq!(first.reciprocal_rank.unwrap(), 0.5);
        assert_relative_eq!(first.groundedness.unwrap(), 1.0);

        let summary = &report.summary;
        assert_eq!(summary.questions, 5);
        // one of two questions with an expected_doc hit
        assert_relative_eq!(summary.recall_at_k.unwrap(), 50.0);
        assert_relative_eq!(summary.mrr.unwrap(), 0.25);
        // groundedness 1.0 and 0.0
        assert_relative_eq!(summary.hallucination_rate.unwrap(), 50.0);
        // "bilinmez" refused; CEO got an empty NoPassages answer
        assert_relative_eq!(summary.unanswerable_accuracy.unwrap(), 50.0);
        assert_eq!(summary.no_passage_answers, 1);
        assert_eq!(summary.generation_failures, 1);
    }

    #[test]
    fn test_retrieval_only_skips_answer_metrics() {
        let report = run_eval(&pipeline(), &questions(), &settings(true), &mut |_, _| {}).unwrap();
        assert!(report.records.iter().all(|r| r.outcome.is_none() && r.answer.is_empty()));
        assert_eq!(report.summary.hallucination_rate, None);
        assert_eq!(report.summary.unanswerable_accuracy, None);
        assert_relative_eq!(report.summary.recall_at_k.unwrap(), 50.0);
    }

    #[test]
    fn test_report_written_to_disk() {
        let tmp = TempDir::new().unwrap();
        let report = run_eval(&pipeline(), &questions(), &settings(true), &mut |_, _| {}).unwrap();
        let (results, summary) = report.write(&tmp.path().join("eval")).unwrap();

        let lines = fs::read_to_string(results).unwrap();
        assert_eq!(lines.lines().count(), 5);
        let first: serde_json::Value = serde_json::from_str(lines.lines().next().unwrap()).unwrap();
        assert_eq!(first["retrieved_docs"][1], "izin.md");

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(summary).unwrap()).unwrap();
        assert_eq!(summary["questions"], 5);
        assert_eq!(summary["settings"]["dedup"], "text_and_source");
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[], settings(false));
        assert_eq!(summary.questions, 0);
        assert_eq!(summary.recall_at_k, None);
        assert_eq!(summary.avg_latency, 0.0);
    }
}
