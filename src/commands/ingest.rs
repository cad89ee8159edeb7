//! `hrag ingest` - rebuild the passage index from a document directory

use anyhow::{bail, Context, Result};
use colored::*;
use std::path::Path;
use std::time::Instant;

use hrag::config::AppConfig;
use hrag::ingest::ingest_directory;

pub fn execute(config: &AppConfig, dir: &Path) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    if !dir.is_dir() {
        bail!("Document directory not found: {}", dir.display());
    }

    println!("{}", "📚 Ingesting documents".bold());
    println!("   Source: {}", dir.display());
    println!("   Index:  {}", config.store.dir.display());
    println!(
        "   Chunks: {} chars, {} overlap",
        config.ingest.chunk_size, config.ingest.chunk_overlap
    );
    println!("   Model:  {}", config.embeddings.model);

    let start = Instant::now();
    let storage = super::open_storage(config)?;
    let mut embedder = super::open_embedder(config)?;

    let stats = ingest_directory(&storage, embedder.as_mut(), dir, &config.ingest)
        .with_context(|| format!("Failed to ingest {}", dir.display()))?;

    println!();
    println!(
        "{} {} documents → {} passages in {:.1}s",
        "✓".green().bold(),
        stats.documents,
        stats.passages,
        start.elapsed().as_secs_f64()
    );
    if stats.skipped > 0 {
        println!(
            "  {}",
            format!("{} files skipped (not UTF-8)", stats.skipped).yellow()
        );
    }
    Ok(())
}
