//! `hrag search` - show the passages a question would be answered from

use anyhow::Result;
use colored::*;

use hrag::config::AppConfig;

use super::truncate;

pub fn execute(config: &AppConfig, query: &str, no_rerank: bool, json: bool) -> Result<()> {
    let pipeline = super::build_pipeline(config, no_rerank)?;
    let retrieved = pipeline.retrieve(query)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&retrieved)?);
        return Ok(());
    }

    println!("{} \"{}\"", "🔍 Query:".bold(), query);
    println!(
        "   {} passages, {}, {:.0} ms",
        retrieved.passages.len(),
        if retrieved.reranked { "reranked" } else { "fused" },
        retrieved.latency.as_secs_f64() * 1000.0
    );
    println!();

    if retrieved.passages.is_empty() {
        println!("{}", "No matching passages.".yellow());
        return Ok(());
    }

    for item in &retrieved.passages {
        let section = item
            .passage
            .section
            .as_deref()
            .map(|s| format!(" § {}", s))
            .unwrap_or_default();
        println!(
            "{:>2}. [{:.4}] {}{}",
            item.rank + 1,
            item.score,
            item.passage.source.cyan(),
            section.dimmed()
        );
        println!("    {}", truncate(&item.passage.text, 160));
    }
    Ok(())
}
