//! Document ingestion: load, chunk, embed, store
//!
//! Chunks are built from whole paragraphs up to a character budget, with a
//! word-aligned character overlap between consecutive chunks of the same
//! section. Each chunk records the nearest preceding section heading.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::IngestSection;
use crate::embeddings::EmbeddingEngine;
use crate::error::{RagError, Result};
use crate::passage::Passage;
use crate::storage::PassageStorage;

/// Passages per embedding call
const BATCH_SIZE: usize = 32;

/// A loaded source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path relative to the ingest root, `/`-separated
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub documents: usize,
    pub passages: usize,
    /// Files skipped because they were not valid UTF-8
    pub skipped: usize,
}

/// Recursively load text files whose extension is in `extensions`
///
/// Paths are visited in sorted order so ingesting the same tree twice
/// produces the same rowids.
pub fn load_documents(dir: &Path, extensions: &[String]) -> Result<(Vec<Document>, usize)> {
    let mut documents = Vec::new();
    let mut skipped = 0;

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let matches_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)));
        if !matches_extension {
            continue;
        }

        let source = path
            .strip_prefix(dir)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        match fs::read_to_string(path) {
            Ok(text) => documents.push(Document { source, text }),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                warn!(path = %path.display(), "skipping non UTF-8 file");
                skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok((documents, skipped))
}

fn heading_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Markdown: "## Yıllık İzin"
            r"^#{1,6}\s+(?P<title>.+?)\s*#*$",
            // Numbered: "3.2 Yıllık İzin", "4) Disiplin"
            r"^(?P<title>\d+(?:\.\d+)*[.)]?\s+\p{Lu}[^.!?:;]{0,80})$",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Section title if `line` is a heading
pub fn detect_heading(line: &str) -> Option<String> {
    let line = line.trim();
    heading_patterns().iter().find_map(|re| {
        re.captures(line)
            .and_then(|c| c.name("title"))
            .map(|m| m.as_str().trim().to_string())
    })
}

struct Block {
    text: String,
    heading: Option<String>,
}

/// Paragraphs separated by blank lines; heading lines are blocks of their own
fn split_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut lines: Vec<&str> = Vec::new();

    fn close(lines: &mut Vec<&str>, blocks: &mut Vec<Block>) {
        if !lines.is_empty() {
            blocks.push(Block {
                text: lines.join("\n"),
                heading: None,
            });
            lines.clear();
        }
    }

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            close(&mut lines, &mut blocks);
        } else if let Some(heading) = detect_heading(trimmed) {
            close(&mut lines, &mut blocks);
            blocks.push(Block {
                text: trimmed.to_string(),
                heading: Some(heading),
            });
        } else {
            lines.push(trimmed);
        }
    }
    close(&mut lines, &mut blocks);
    blocks
}

/// Split an oversized paragraph at word boundaries into pieces of at most `size` chars
fn split_long(text: &str, size: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for word in text.split_whitespace() {
        let word_chars = word.chars().count();
        if word_chars > size {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            pieces.extend(chars.chunks(size).map(|c| c.iter().collect::<String>()));
            continue;
        }
        let needed = if current.is_empty() { word_chars } else { word_chars + 1 };
        if current_chars + needed > size {
            pieces.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_chars += 1;
        }
        current.push_str(word);
        current_chars += word_chars;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Last `overlap` chars of `text`, starting at a word boundary
fn overlap_tail(text: &str, overlap: usize) -> String {
    let total = text.chars().count();
    if overlap == 0 || total == 0 {
        return String::new();
    }
    let start = total.saturating_sub(overlap);
    let tail: String = text.chars().skip(start).collect();
    if start == 0 {
        return tail;
    }
    // Drop the partial first word
    match tail.find(char::is_whitespace) {
        Some(pos) => tail[pos..].trim_start().to_string(),
        None => String::new(),
    }
}

struct Chunker<'a> {
    source: &'a str,
    chunk_size: usize,
    overlap: usize,
    buf: String,
    buf_chars: usize,
    section: Option<String>,
    /// Whether `buf` holds anything beyond the carried-over overlap
    has_new: bool,
    chunks: Vec<Passage>,
}

impl<'a> Chunker<'a> {
    fn push(&mut self, paragraph: &str) {
        let chars = paragraph.chars().count();
        if self.buf_chars > 0 && self.buf_chars + 2 + chars > self.chunk_size {
            self.flush(true);
            if self.buf_chars + 2 + chars > self.chunk_size {
                self.buf.clear();
                self.buf_chars = 0;
            }
        }
        if self.buf_chars > 0 {
            self.buf.push_str("\n\n");
            self.buf_chars += 2;
        }
        self.buf.push_str(paragraph);
        self.buf_chars += chars;
        self.has_new = true;
    }

    fn flush(&mut self, keep_overlap: bool) {
        if self.has_new {
            let mut passage = Passage::new(self.buf.trim(), self.source);
            passage.section = self.section.clone();
            self.chunks.push(passage);
        }
        self.buf = if keep_overlap {
            overlap_tail(&self.buf, self.overlap)
        } else {
            String::new()
        };
        self.buf_chars = self.buf.chars().count();
        self.has_new = false;
    }
}

/// Split a document into passages of roughly `chunk_size` characters
pub fn chunk_document(text: &str, source: &str, chunk_size: usize, overlap: usize) -> Vec<Passage> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size / 2);
    // Leave room for the carried overlap in front of a split piece
    let piece_size = chunk_size.saturating_sub(overlap + 2).max(1);

    let mut chunker = Chunker {
        source,
        chunk_size,
        overlap,
        buf: String::new(),
        buf_chars: 0,
        section: None,
        has_new: false,
        chunks: Vec::new(),
    };

    for block in split_blocks(text) {
        if let Some(heading) = block.heading {
            chunker.flush(false);
            chunker.section = Some(heading);
        }
        if block.text.chars().count() > chunk_size {
            for piece in split_long(&block.text, piece_size) {
                chunker.push(&piece);
            }
        } else {
            chunker.push(&block.text);
        }
    }
    chunker.flush(false);
    chunker.chunks
}

/// Replace the store contents with the chunked documents under `dir`
pub fn ingest_directory(
    storage: &PassageStorage,
    embedder: &mut dyn EmbeddingEngine,
    dir: &Path,
    config: &IngestSection,
) -> Result<IngestStats> {
    if embedder.dimension() != storage.dimensions() {
        return Err(RagError::Index(format!(
            "embedder produces {} dimensions, store expects {}",
            embedder.dimension(),
            storage.dimensions()
        )));
    }

    let (documents, skipped) = load_documents(dir, &config.extensions)?;

    let mut passages = Vec::new();
    for document in &documents {
        let chunks = chunk_document(
            &document.text,
            &document.source,
            config.chunk_size,
            config.chunk_overlap,
        );
        debug!(source = %document.source, chunks = chunks.len(), "chunked document");
        passages.extend(chunks);
    }

    if passages.is_empty() {
        warn!(dir = %dir.display(), "no passages to ingest");
    }

    // Embed everything before the store is touched
    let mut items: Vec<(Passage, Vec<f32>)> = Vec::with_capacity(passages.len());
    for batch in passages.chunks(BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
        let embeddings = embedder
            .embed_passages(&texts)
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?;
        if embeddings.len() != batch.len() {
            return Err(RagError::Embedding(format!(
                "embedder returned {} vectors for {} passages",
                embeddings.len(),
                batch.len()
            )));
        }
        items.extend(batch.iter().cloned().zip(embeddings));
        debug!(embedded = items.len(), total = passages.len(), "embedding passages");
    }

    storage.replace_all(&items)?;

    let stats = IngestStats {
        documents: documents.len(),
        passages: passages.len(),
        skipped,
    };
    info!(
        documents = stats.documents,
        passages = stats.passages,
        skipped = stats.skipped,
        "ingest complete"
    );
    Ok(stats)
}
