//! Storage layer - SQLite + FTS5 + USearch hybrid storage
//!
//! This module implements dual storage strategy:
//! - SQLite for passages and their metadata (source file, section)
//! - FTS5 over the same rows for BM25 lexical search
//! - USearch for vector similarity search (ANN via HNSW indices)
//!
//! # Example
//!
//! ```no_run
//! use hrag::storage::PassageStorage;
//!
//! let storage = PassageStorage::open(".hrag/index", 384)?;
//! println!("{} passages", storage.count()?);
//! # Ok::<(), hrag::RagError>(())
//! ```

mod passages;

pub use passages::{LexicalHit, PassageStorage};
