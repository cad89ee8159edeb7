//! `hrag eval` - run the labeled question set and report metrics

use anyhow::{Context, Result};
use colored::*;

use hrag::config::AppConfig;
use hrag::eval::{run_eval, EvalSettings, EvalSummary, QuestionRecord, QuestionSet};

use super::truncate;

pub struct EvalOptions {
    pub retrieval_only: bool,
    pub no_rerank: bool,
    pub json: bool,
}

pub fn execute(config: &AppConfig, options: EvalOptions) -> Result<()> {
    let questions = QuestionSet::load(&config.eval.questions)
        .with_context(|| format!("Failed to load {}", config.eval.questions.display()))?;

    let pipeline = super::build_pipeline(config, options.no_rerank)?;
    let reranker = (!options.no_rerank && config.reranker.enabled)
        .then(|| config.reranker.model_dir.display().to_string());

    let settings = EvalSettings {
        top_k: pipeline.top_k(),
        rrf_k: config.retrieval.rrf_k,
        weight_dense: config.retrieval.weight_dense,
        weight_lexical: config.retrieval.weight_lexical,
        dedup: config.retrieval.dedup,
        reranker,
        embedding_model: config.embeddings.model.clone(),
        llm_model: config.generator.model.clone(),
        refusal: config.generator.refusal.clone(),
        retrieval_only: options.retrieval_only,
    };

    if !options.json {
        println!("🔬 HR Assistant Evaluation");
        println!("   Questions: {}", questions.len());
        println!("   Top-k: {}, RRF k: {}", settings.top_k, settings.rrf_k);
        println!(
            "   Mode: {}",
            if options.retrieval_only { "retrieval only" } else { "retrieval + generation" }
        );
        println!();
    }

    let total = questions.len();
    let report = run_eval(&pipeline, &questions, &settings, &mut |i, record| {
        if !options.json {
            print_progress(i, total, record);
        }
    })?;

    let (results_path, summary_path) = report.write(&config.eval.report_dir)?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report.summary)?);
        return Ok(());
    }

    print_summary(&report.summary);
    println!();
    println!("   Results: {}", results_path.display());
    println!("   Summary: {}", summary_path.display());
    Ok(())
}

fn print_progress(i: usize, total: usize, record: &QuestionRecord) {
    let marker = match record.recall_hit {
        Some(true) => "✓".green(),
        Some(false) => "✗".red(),
        None => "·".dimmed(),
    };
    println!(
        "   [{}/{}] {} {} ({:.2}s)",
        i + 1,
        total,
        marker,
        truncate(&record.question, 60),
        record.latency
    );
}

fn percent(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}%", v)).unwrap_or_else(|| "n/a".to_string())
}

fn print_summary(summary: &EvalSummary) {
    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📊 Results");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("   Retrieval:");
    println!("   ├─ Recall@{}:  {}", summary.settings.top_k, percent(summary.recall_at_k));
    println!("   ├─ Section:    {}", percent(summary.section_recall));
    println!(
        "   └─ MRR:        {}",
        summary.mrr.map(|m| format!("{:.3}", m)).unwrap_or_else(|| "n/a".to_string())
    );
    println!();
    println!("   Latency:");
    println!("   ├─ p50:  {:.0}ms", summary.p50_latency * 1000.0);
    println!("   ├─ p95:  {:.0}ms", summary.p95_latency * 1000.0);
    println!("   └─ mean: {:.0}ms", summary.avg_latency * 1000.0);

    if !summary.settings.retrieval_only {
        println!();
        println!("   Answers:");
        println!("   ├─ Hallucination:  {}", percent(summary.hallucination_rate));
        println!("   ├─ Unanswerable:   {}", percent(summary.unanswerable_accuracy));
        println!("   ├─ No passages:    {}", summary.no_passage_answers);
        let failures = summary.generation_failures.to_string();
        println!(
            "   └─ Gen failures:   {}",
            if summary.generation_failures > 0 { failures.red() } else { failures.normal() }
        );
    }
}
