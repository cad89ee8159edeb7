//! End-to-end: ingest a document directory, retrieve, answer, evaluate
//!
//! Uses the hashing embedder so no model files are needed.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use hrag::config::IngestSection;
use hrag::embeddings::HashEmbedder;
use hrag::eval::{run_eval, EvalSettings, QuestionSet};
use hrag::generation::Generator;
use hrag::ingest::ingest_directory;
use hrag::retrieval::{DenseRetriever, FusionConfig, HybridRetriever, LexicalRetriever};
use hrag::storage::PassageStorage;
use hrag::{AnswerOutcome, KeyPolicy, RagPipeline, RankedResultSet};
use tempfile::TempDir;

const DIM: usize = 64;

/// Answers with the best-ranked passage
struct EchoGenerator;

impl Generator for EchoGenerator {
    fn name(&self) -> &str {
        "echo"
    }

    fn generate(&self, _query: &str, passages: &RankedResultSet) -> hrag::Result<String> {
        Ok(passages
            .first()
            .map(|p| p.passage.text.clone())
            .unwrap_or_default())
    }
}

fn write_corpus(dir: &Path) {
    fs::write(
        dir.join("izin.md"),
        "# Yıllık İzin\n\nÇalışanlara yılda 14 gün ücretli yıllık izin verilir.\n\n\
         # Doğum İzni\n\nDoğum izni 16 haftadır.\n",
    )
    .unwrap();
    fs::write(
        dir.join("bordro.md"),
        "# Maaş Ödemeleri\n\nMaaşlar her ayın 15'inde banka hesabına yatırılır.\n",
    )
    .unwrap();
    fs::create_dir(dir.join("yan-haklar")).unwrap();
    fs::write(
        dir.join("yan-haklar/yemek.txt"),
        "Yemek kartı bakiyesi her ay yüklenir.\n",
    )
    .unwrap();
    // Not ingested
    fs::write(dir.join("notlar.csv"), "a,b\n").unwrap();
}

fn ingested_storage(docs: &Path) -> Arc<PassageStorage> {
    let storage = PassageStorage::open_in_memory(DIM).unwrap();
    let mut embedder = HashEmbedder::new(DIM);
    let stats = ingest_directory(&storage, &mut embedder, docs, &IngestSection::default()).unwrap();
    assert_eq!(stats.documents, 3);
    assert!(stats.passages >= 3);
    Arc::new(storage)
}

fn pipeline(storage: Arc<PassageStorage>) -> RagPipeline {
    let hybrid = HybridRetriever::new(
        Box::new(DenseRetriever::new(
            Arc::clone(&storage),
            Box::new(HashEmbedder::new(DIM)),
        )),
        Box::new(LexicalRetriever::new(storage)),
        FusionConfig::default(),
        2,
    )
    .unwrap();
    RagPipeline::new(Box::new(hybrid), Box::new(EchoGenerator), 3, 3).unwrap()
}

#[test]
fn test_ingest_then_answer() {
    let docs = TempDir::new().unwrap();
    write_corpus(docs.path());
    let storage = ingested_storage(docs.path());
    assert_eq!(storage.count().unwrap(), storage.vector_count());

    let answer = pipeline(storage).answer("yıllık izin kaç gün").unwrap();

    assert_eq!(answer.outcome, AnswerOutcome::Answered);
    assert!(answer.passages.len() <= 3);
    assert!(answer.citations.iter().any(|c| c == "izin.md"));
    assert!(!answer.text.is_empty());
}

#[test]
fn test_nested_sources_use_forward_slashes() {
    let docs = TempDir::new().unwrap();
    write_corpus(docs.path());
    let storage = ingested_storage(docs.path());

    let hits = storage.search_lexical("\"yemek\"", 5).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].1.source, "yan-haklar/yemek.txt");
}

#[test]
fn test_reingest_replaces_index() {
    let docs = TempDir::new().unwrap();
    let index = TempDir::new().unwrap();
    write_corpus(docs.path());

    let mut embedder = HashEmbedder::new(DIM);
    let first = {
        let storage = PassageStorage::open(index.path(), DIM).unwrap();
        ingest_directory(&storage, &mut embedder, docs.path(), &IngestSection::default()).unwrap()
    };

    // Second run over the same corpus must not double the passages
    let storage = PassageStorage::open(index.path(), DIM).unwrap();
    assert_eq!(storage.count().unwrap(), first.passages);
    ingest_directory(&storage, &mut embedder, docs.path(), &IngestSection::default()).unwrap();
    assert_eq!(storage.count().unwrap(), first.passages);
    assert_eq!(storage.vector_count(), first.passages);
}

#[test]
fn test_eval_over_ingested_corpus() {
    let docs = TempDir::new().unwrap();
    let reports = TempDir::new().unwrap();
    write_corpus(docs.path());
    let pipeline = pipeline(ingested_storage(docs.path()));

    let questions = QuestionSet::parse(
        r#"{"question": "Maaşlar ayın kaçında yatırılır?", "expected_doc": "bordro.md", "anchor_keywords": "15"}
{"Question": "Doğum izni kaç hafta?", "expected_doc": "izin.md", "expected_section": "Doğum İzni"}"#,
    )
    .unwrap();
    let settings = EvalSettings {
        top_k: 3,
        rrf_k: 60,
        weight_dense: 1.0,
        weight_lexical: 1.0,
        dedup: KeyPolicy::TextAndSource,
        reranker: None,
        embedding_model: "hash".to_string(),
        llm_model: "echo".to_string(),
        refusal: "Bilmiyorum".to_string(),
        retrieval_only: false,
    };

    let report = run_eval(&pipeline, &questions, &settings, &mut |_, _| {}).unwrap();
    assert_eq!(report.records.len(), 2);
    assert!(report.records.iter().all(|r| r.recall_hit.is_some()));
    assert!(report.summary.p95_latency >= report.summary.p50_latency);

    let (results, summary) = report.write(reports.path()).unwrap();
    let lines = fs::read_to_string(results).unwrap();
    assert_eq!(lines.lines().count(), 2);
    let summary: serde_json::Value = serde_json::from_str(&fs::read_to_string(summary).unwrap()).unwrap();
    assert_eq!(summary["questions"], 2);
    assert_eq!(summary["settings"]["top_k"], 3);
}
