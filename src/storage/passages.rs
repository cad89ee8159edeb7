//! Passage storage using SQLite + FTS5 + USearch
//!
//! SQLite stores the source of truth (passage text, source, section).
//! An FTS5 table over the same rows serves BM25 lexical search, and USearch
//! provides vector similarity search keyed by the SQLite rowid.
//!
//! Rowids come from an AUTOINCREMENT column and are never reused, so a vector
//! left over from an earlier corpus can only point at a missing row.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::{RagError, Result};
use crate::passage::Passage;

const DB_FILE: &str = "passages.db";
const INDEX_FILE: &str = "passages.usearch";
const INDEX_TMP_FILE: &str = "passages.usearch.tmp";

/// A lexical hit: (rowid, passage, score) with score = -bm25, higher is better
pub type LexicalHit = (i64, Passage, f32);

/// Dual storage for passages: SQLite/FTS5 + USearch
///
/// The connection sits behind a mutex so the store can be shared between the
/// dense and lexical retrievers running on different threads. Retrieval only
/// reads; `insert_batch`, `replace_all` and `clear` are used by ingestion.
pub struct PassageStorage {
    db: Mutex<Connection>,
    vectors: RwLock<Index>,
    index_path: Option<PathBuf>,
    dimensions: usize,
}

fn new_index(dimensions: usize) -> Result<Index> {
    let options = IndexOptions {
        dimensions,
        metric: MetricKind::Cos,
        quantization: ScalarKind::F32,
        ..Default::default()
    };
    Index::new(&options).map_err(|e| RagError::Index(format!("failed to create index: {}", e)))
}

/// Add `(rowid, embedding)` pairs, growing capacity as needed
fn add_vectors(index: &Index, rowids: &[i64], items: &[(Passage, Vec<f32>)]) -> Result<()> {
    let needed = index.size() + items.len();
    if needed > index.capacity() {
        index
            .reserve(needed)
            .map_err(|e| RagError::Index(format!("failed to reserve capacity: {}", e)))?;
    }
    for (rowid, (_, embedding)) in rowids.iter().zip(items) {
        index
            .add(*rowid as u64, embedding.as_slice())
            .map_err(|e| RagError::Index(format!("failed to add vector: {}", e)))?;
    }
    Ok(())
}

fn remove_vectors(index: &Index, rowids: &[i64]) {
    for rowid in rowids {
        if let Err(e) = index.remove(*rowid as u64) {
            warn!(rowid, error = %e, "failed to remove vector");
        }
    }
}

impl PassageStorage {
    /// Open or create passage storage in `dir`
    ///
    /// Creates two files:
    /// - `{dir}/passages.db` - SQLite database with FTS5 table
    /// - `{dir}/passages.usearch` - USearch vector index
    pub fn open<P: AsRef<Path>>(dir: P, dimensions: usize) -> Result<Self> {
        let base = dir.as_ref();
        fs::create_dir_all(base)?;

        let db = Connection::open(base.join(DB_FILE))?;
        let index_path = base.join(INDEX_FILE);
        let vectors = new_index(dimensions)?;

        if index_path.exists() {
            vectors.load(&index_path.to_string_lossy()).map_err(|e| {
                RagError::Index(format!("failed to load {}: {}", index_path.display(), e))
            })?;
            if vectors.dimensions() != dimensions {
                return Err(RagError::Index(format!(
                    "index {} has {} dimensions, embedder produces {}",
                    index_path.display(),
                    vectors.dimensions(),
                    dimensions
                )));
            }
        }

        let storage = Self::with_parts(db, vectors, Some(index_path))?;
        debug!(
            dir = %base.display(),
            passages = storage.count()?,
            vectors = storage.vector_count(),
            "opened passage storage"
        );
        Ok(storage)
    }

    /// In-memory storage (nothing persisted)
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        Self::with_parts(Connection::open_in_memory()?, new_index(dimensions)?, None)
    }

    fn with_parts(db: Connection, vectors: Index, index_path: Option<PathBuf>) -> Result<Self> {
        Self::init_schema(&db)?;
        Ok(Self {
            db: Mutex::new(db),
            dimensions: vectors.dimensions(),
            vectors: RwLock::new(vectors),
            index_path,
        })
    }

    /// Initialize SQLite schema
    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS passages (
                rowid INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                section TEXT,
                created_at TEXT NOT NULL
            );
            CREATE VIRTUAL TABLE IF NOT EXISTS passages_fts USING fts5(
                text,
                section,
                tokenize = 'unicode61 remove_diacritics 2'
            );",
        )?;
        Ok(())
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn check_dimensions(&self, items: &[(Passage, Vec<f32>)]) -> Result<()> {
        for (_, embedding) in items {
            if embedding.len() != self.dimensions {
                return Err(RagError::Index(format!(
                    "embedding has {} dimensions, index expects {}",
                    embedding.len(),
                    self.dimensions
                )));
            }
        }
        Ok(())
    }

    fn insert_rows(tx: &Transaction<'_>, items: &[(Passage, Vec<f32>)]) -> Result<Vec<i64>> {
        let created_at = Utc::now().to_rfc3339();
        let mut insert = tx.prepare(
            "INSERT INTO passages (text, source, section, created_at)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING rowid",
        )?;
        let mut insert_fts =
            tx.prepare("INSERT INTO passages_fts (rowid, text, section) VALUES (?1, ?2, ?3)")?;

        let mut rowids = Vec::with_capacity(items.len());
        for (passage, _) in items {
            let rowid: i64 = insert.query_row(
                params![&passage.text, &passage.source, &passage.section, &created_at],
                |row| row.get(0),
            )?;
            insert_fts.execute(params![rowid, &passage.text, &passage.section])?;
            rowids.push(rowid);
        }
        Ok(rowids)
    }

    /// Insert passages (and their embeddings) in one transaction
    ///
    /// Returns the assigned rowids in input order. Rowids follow insertion
    /// order, which is the corpus order used for lexical tie-breaking. The
    /// rows are committed only after every vector is in the index; on failure
    /// neither side keeps the batch.
    pub fn insert_batch(&self, items: &[(Passage, Vec<f32>)]) -> Result<Vec<i64>> {
        self.check_dimensions(items)?;

        let mut db = self.db.lock();
        let tx = db.transaction()?;
        let rowids = Self::insert_rows(&tx, items)?;

        let vectors = self.vectors.write();
        if let Err(e) = add_vectors(&vectors, &rowids, items) {
            remove_vectors(&vectors, &rowids);
            return Err(e);
        }
        if let Err(e) = tx.commit() {
            remove_vectors(&vectors, &rowids);
            return Err(e.into());
        }
        Ok(rowids)
    }

    /// Replace every passage and vector with `items`
    ///
    /// SQLite rows are swapped in one transaction. The new vector index is
    /// built beside the live one and written to disk before the commit, so a
    /// failure at any step leaves the previous corpus intact.
    pub fn replace_all(&self, items: &[(Passage, Vec<f32>)]) -> Result<Vec<i64>> {
        self.check_dimensions(items)?;

        let mut db = self.db.lock();
        let tx = db.transaction()?;
        tx.execute_batch("DELETE FROM passages; DELETE FROM passages_fts;")?;
        let rowids = Self::insert_rows(&tx, items)?;

        let fresh = new_index(self.dimensions)?;
        add_vectors(&fresh, &rowids, items)?;
        let staged = self.stage_index(&fresh)?;

        tx.commit()?;
        *self.vectors.write() = fresh;
        drop(db);

        if let Some(path) = &self.index_path {
            match staged {
                Some(tmp) => fs::rename(&tmp, path)?,
                None if path.exists() => fs::remove_file(path)?,
                None => {}
            }
        }

        info!(passages = rowids.len(), "replaced passage store");
        Ok(rowids)
    }

    /// Write a non-empty `index` next to the live index file
    fn stage_index(&self, index: &Index) -> Result<Option<PathBuf>> {
        let Some(path) = &self.index_path else {
            return Ok(None);
        };
        if index.size() == 0 {
            return Ok(None);
        }
        let tmp = path.with_file_name(INDEX_TMP_FILE);
        index
            .save(&tmp.to_string_lossy())
            .map_err(|e| RagError::Index(format!("failed to save {}: {}", tmp.display(), e)))?;
        Ok(Some(tmp))
    }

    /// Load a passage by rowid
    pub fn get(&self, rowid: i64) -> Result<Option<Passage>> {
        let db = self.db.lock();
        let passage = db
            .query_row(
                "SELECT text, source, section FROM passages WHERE rowid = ?1",
                params![rowid],
                |row| {
                    Ok(Passage {
                        text: row.get(0)?,
                        source: row.get(1)?,
                        section: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(passage)
    }

    /// Nearest neighbours as (rowid, cosine similarity), best first
    ///
    /// Equal similarities are ordered by ascending rowid.
    pub fn search_vectors(&self, embedding: &[f32], limit: usize) -> Result<Vec<(i64, f32)>> {
        let vectors = self.vectors.read();
        if vectors.size() == 0 || limit == 0 {
            return Ok(Vec::new());
        }
        if embedding.len() != self.dimensions {
            return Err(RagError::Index(format!(
                "query embedding has {} dimensions, index expects {}",
                embedding.len(),
                self.dimensions
            )));
        }

        let matches = vectors
            .search(embedding, limit)
            .map_err(|e| RagError::Index(format!("vector search failed: {}", e)))?;

        let mut hits: Vec<(i64, f32)> = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            // Convert distance to similarity (1 - distance for cosine)
            .map(|(key, distance)| (*key as i64, (1.0 - distance).max(0.0)))
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        hits.truncate(limit);
        Ok(hits)
    }

    /// BM25 search over the FTS5 table
    ///
    /// `fts_query` must already be valid FTS5 syntax (see `lexical::prepare_fts_query`).
    /// Ties on score are ordered by ascending rowid.
    pub fn search_lexical(&self, fts_query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let db = self.db.lock();
        let mut stmt = db.prepare(
            "SELECT p.rowid, p.text, p.source, p.section, bm25(passages_fts) AS score
             FROM passages_fts
             JOIN passages p ON p.rowid = passages_fts.rowid
             WHERE passages_fts MATCH ?1
             ORDER BY score ASC, p.rowid ASC
             LIMIT ?2",
        )?;

        let hits = stmt
            .query_map(params![fts_query, limit as i64], |row| {
                let bm25_score: f64 = row.get(4)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    Passage {
                        text: row.get(1)?,
                        source: row.get(2)?,
                        section: row.get(3)?,
                    },
                    // FTS5 bm25() is negative, more negative = better match
                    (-bm25_score as f32).max(0.0),
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(hits)
    }

    /// Save USearch index to disk (no-op for in-memory storage)
    ///
    /// An empty index is persisted by removing the file.
    pub fn save_index(&self) -> Result<()> {
        let Some(path) = &self.index_path else {
            return Ok(());
        };
        let vectors = self.vectors.read();
        if vectors.size() == 0 {
            if path.exists() {
                fs::remove_file(path)?;
            }
            return Ok(());
        }
        vectors
            .save(&path.to_string_lossy())
            .map_err(|e| RagError::Index(format!("failed to save {}: {}", path.display(), e)))?;
        info!(path = %path.display(), vectors = vectors.size(), "saved vector index");
        Ok(())
    }

    /// Remove every passage and vector, on disk as well
    pub fn clear(&self) -> Result<()> {
        let db = self.db.lock();
        db.execute_batch("DELETE FROM passages; DELETE FROM passages_fts;")?;
        *self.vectors.write() = new_index(self.dimensions)?;
        drop(db);
        self.save_index()
    }

    /// Number of passages in SQLite
    pub fn count(&self) -> Result<usize> {
        let db = self.db.lock();
        let count: i64 = db.query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Number of vectors in the USearch index
    pub fn vector_count(&self) -> usize {
        self.vectors.read().size()
    }
}
