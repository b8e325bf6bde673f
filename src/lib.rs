//! pampax - local semantic code indexing with hybrid search.
//!
//! The crate walks a repository, splits source files into symbol-aware
//! chunks, embeds them through a pluggable provider, and persists three
//! portable artifacts:
//!
//! - `.pampa/pampa.db` - SQLite database of chunks and embeddings
//! - `.pampa/chunks/{sha}.gz[.enc]` - content-addressed chunk store
//! - `pampa.codemap.json` - human-readable ordered codemap
//!
//! Queries run against the database only, fusing cosine similarity with
//! BM25 via Reciprocal Rank Fusion, and fetch chunk content from the
//! store for the final hits.

pub mod chunker;
pub mod chunkstore;
pub mod cli;
pub mod codemap;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod ignore_rules;
pub mod index;
pub mod output;
pub mod pathutil;
pub mod provider;
pub mod search;
pub mod walker;

pub use config::Config;
pub use error::{ErrorCode, PampaxError, Result};

use std::sync::Arc;

/// Shared handles for one command invocation.
///
/// The database, chunk store and provider are passed explicitly instead of
/// living in globals; the only process-wide state is the logger sink and
/// the shutdown flag in [`constants`].
pub struct AppContext {
    pub config: Config,
    pub db: db::Database,
    pub store: chunkstore::ChunkStore,
    pub provider: Arc<dyn provider::EmbeddingProvider>,
}
