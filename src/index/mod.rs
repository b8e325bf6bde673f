//! Index run orchestration.
//!
//! A run walks the repository, chunks every candidate file, embeds the
//! chunks in provider batches, and persists the three artifacts under a
//! single consistent view:
//!
//! 1. chunk files are written to the store first,
//! 2. database rows commit in one transaction (stale rows deleted inside
//!    it),
//! 3. the codemap is atomically replaced,
//! 4. orphaned chunk files are swept last.
//!
//! Cancellation is cooperative: the shutdown flag is checked between
//! files and between embedding batches, and aborting before the commit
//! leaves the previous database and codemap untouched. Chunk files
//! already written by an aborted run are reconciled by the next sweep.

mod lock;

pub use lock::acquire_writer_lock;

use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunker::{self, Chunk};
use crate::codemap::{Codemap, CodemapEntry};
use crate::constants::{check_shutdown, CODEMAP_FILE_NAME, INDEX_DIR_NAME};
use crate::db::{ChunkRecord, FieldWarning};
use crate::error::{PampaxError, Result};
use crate::ignore_rules::IgnoreEngine;
use crate::output;
use crate::provider::EmbeddingService;
use crate::walker::{self, WalkWarning};
use crate::AppContext;

/// Result of one index/update run.
#[derive(Debug, Default, serde::Serialize)]
pub struct RunSummary {
    pub root: String,
    pub files_indexed: usize,
    pub chunks_written: usize,
    pub chunks_without_embedding: usize,
    pub files_skipped_invalid_utf8: usize,
    pub stale_rows_removed: usize,
    pub orphan_files_removed: usize,
    pub walk_warnings: Vec<WalkWarning>,
    pub field_warnings: Vec<FieldWarning>,
    pub embedding_errors: Vec<String>,
    pub duration_ms: u64,
}

/// Paths of the on-disk artifacts for a repository root.
pub struct IndexLayout {
    pub index_dir: PathBuf,
    pub db_path: PathBuf,
    pub chunks_dir: PathBuf,
    pub codemap_path: PathBuf,
}

impl IndexLayout {
    pub fn for_root(root: &Path) -> Self {
        let index_dir = root.join(INDEX_DIR_NAME);
        IndexLayout {
            db_path: index_dir.join(crate::constants::DB_FILE_NAME),
            chunks_dir: index_dir.join(crate::constants::CHUNKS_DIR_NAME),
            codemap_path: root.join(CODEMAP_FILE_NAME),
            index_dir,
        }
    }
}

struct StagedChunk {
    rel_path: String,
    chunk: Chunk,
    id: String,
    embed_text: String,
}

/// Run a full index over `root`.
///
/// `update` is a full reindex in v1 and routes here as well.
pub async fn run_index(
    ctx: &mut AppContext,
    root: &Path,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let started = Instant::now();
    let root = root
        .canonicalize()
        .map_err(|_| PampaxError::InvalidInput(format!("{} is not a directory", root.display())))?;
    if !root.is_dir() {
        return Err(PampaxError::InvalidInput(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let layout = IndexLayout::for_root(&root);
    std::fs::create_dir_all(&layout.index_dir)?;
    let _writer_lock = acquire_writer_lock(&layout.index_dir)?;

    info!(root = %root.display(), "starting index run");

    // Discovery.
    let engine = IgnoreEngine::build(&root)?;
    let report = walker::walk_repository(&root, &engine, cancel)?;
    debug!(
        files = report.paths.len(),
        warnings = report.warnings.len(),
        "walk complete"
    );

    let mut summary = RunSummary {
        root: root.display().to_string(),
        walk_warnings: report.warnings.clone(),
        ..RunSummary::default()
    };

    // Chunking + chunk-store writes.
    let progress = output::file_bar(report.paths.len());
    let mut staged: Vec<StagedChunk> = Vec::new();

    for rel_path in &report.paths {
        if check_shutdown(cancel) {
            progress.finish_and_clear();
            return Err(PampaxError::Internal("index run cancelled".to_string()));
        }
        progress.set_message(rel_path.clone());

        let host_path = crate::pathutil::to_host_path(&root, rel_path);
        let bytes = match std::fs::read(&host_path) {
            Ok(b) => b,
            Err(e) => {
                warn!(path = %rel_path, "unreadable file skipped: {e}");
                progress.inc(1);
                continue;
            }
        };
        let content = match String::from_utf8(bytes) {
            Ok(c) => c,
            Err(_) => {
                warn!(path = %rel_path, "invalid UTF-8, file excluded");
                summary.files_skipped_invalid_utf8 += 1;
                progress.inc(1);
                continue;
            }
        };

        let lang = match chunker::language_for_path(rel_path) {
            Some(l) => l,
            None => {
                progress.inc(1);
                continue;
            }
        };

        let chunks = chunker::chunk_file(lang, &content);
        for chunk in chunks {
            // Chunk files are written before the row that references them.
            ctx.store.write_chunk(&chunk.sha, chunk.text.as_bytes())?;

            let id = chunk.id(rel_path);
            let embed_text = embedding_text(&chunk);
            staged.push(StagedChunk {
                rel_path: rel_path.clone(),
                chunk,
                id,
                embed_text,
            });
        }

        summary.files_indexed += 1;
        progress.inc(1);
    }
    progress.finish_and_clear();

    // Embedding in provider batches.
    let service = EmbeddingService::new(ctx.provider.clone(), &ctx.config);
    let texts: Vec<String> = staged.iter().map(|s| s.embed_text.clone()).collect();
    if !staged.is_empty() {
        output::status(format!(
            "embedding {} chunks via {}...",
            staged.len(),
            service.provider_name()
        ));
    }
    let (embeddings, embed_errors) = service.embed_batch(&texts, cancel).await?;
    summary.embedding_errors = embed_errors;

    // Row + codemap assembly in deterministic file order.
    let provider_name = service.provider_name().to_string();
    let dims = service.dimensions();
    let mut records: Vec<ChunkRecord> = Vec::with_capacity(staged.len());
    let mut codemap = Codemap::new();

    for (staged_chunk, embedding) in staged.iter().zip(embeddings.into_iter()) {
        if embedding.is_none() {
            summary.chunks_without_embedding += 1;
        }
        records.push(build_record(
            staged_chunk,
            embedding,
            &provider_name,
            dims,
        ));
        codemap.insert(
            staged_chunk.id.clone(),
            build_codemap_entry(staged_chunk, &provider_name),
        );
    }

    if check_shutdown(cancel) {
        return Err(PampaxError::Internal("index run cancelled".to_string()));
    }

    // Single-transaction commit, then atomic codemap replace.
    let (field_warnings, stale_removed) = ctx.db.commit_run(&records)?;
    summary.field_warnings = field_warnings;
    summary.stale_rows_removed = stale_removed;
    summary.chunks_written = records.len();

    codemap.save(&layout.codemap_path)?;

    // Orphan sweep: chunk files no longer referenced by any row. Both
    // extensions are removed for safety.
    let referenced = ctx.db.referenced_shas()?;
    for sha in ctx.store.list_shas()? {
        if !referenced.contains(&sha) {
            ctx.store.remove_chunk(&sha)?;
            summary.orphan_files_removed += 1;
        }
    }

    summary.duration_ms = started.elapsed().as_millis() as u64;
    info!(
        files = summary.files_indexed,
        chunks = summary.chunks_written,
        orphans = summary.orphan_files_removed,
        ms = summary.duration_ms,
        "index run complete"
    );
    Ok(summary)
}

/// Text handed to the embedding provider for one chunk.
///
/// Signature and doc comments front-load the semantic signal the same way
/// the searchable text is assembled for BM25.
fn embedding_text(chunk: &Chunk) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(sig) = chunk.meta.signature.as_deref() {
        parts.push(sig);
    }
    if let Some(doc) = chunk.meta.doc_comments.as_deref() {
        parts.push(doc);
    }
    parts.push(&chunk.text);
    parts.join("\n")
}

fn build_record(
    staged: &StagedChunk,
    embedding: Option<Vec<f64>>,
    provider_name: &str,
    dims: usize,
) -> ChunkRecord {
    let chunk = &staged.chunk;
    let has_embedding = embedding.is_some();
    let tags = default_tags(&staged.rel_path, chunk);

    ChunkRecord {
        id: staged.id.clone(),
        file_path: staged.rel_path.clone(),
        symbol: chunk.symbol.clone().unwrap_or_default(),
        sha: chunk.sha.clone(),
        lang: chunk.lang.to_string(),
        chunk_type: chunk.chunk_type.clone(),
        embedding,
        embedding_provider: has_embedding.then(|| provider_name.to_string()),
        embedding_dimensions: has_embedding.then_some(dims),
        pampa_tags: serde_json::to_string(&tags).ok(),
        pampa_intent: None,
        pampa_description: None,
        doc_comments: chunk.meta.doc_comments.clone(),
        variables_used: if chunk.meta.variables.is_empty() {
            None
        } else {
            serde_json::to_string(&chunk.meta.variables).ok()
        },
        context_info: Some(
            serde_json::json!({
                "start_line": chunk.start_line,
                "end_line": chunk.end_line,
            })
            .to_string(),
        ),
    }
}

/// Deterministic default tags: language, chunk type, and top directory.
fn default_tags(rel_path: &str, chunk: &Chunk) -> Vec<String> {
    let mut tags = vec![chunk.lang.to_string(), chunk.chunk_type.clone()];
    if let Some((top, _)) = rel_path.split_once('/') {
        tags.push(top.to_string());
    }
    tags
}

fn build_codemap_entry(staged: &StagedChunk, provider_name: &str) -> CodemapEntry {
    let chunk = &staged.chunk;
    let mut entry = CodemapEntry::new(staged.rel_path.clone(), chunk.lang, chunk.sha.clone());
    entry.chunk_type = Some(chunk.chunk_type.clone());
    entry.provider = Some(provider_name.to_string());
    entry.symbol = chunk.symbol.clone();
    entry.symbol_calls = chunk.meta.calls.clone();
    entry.symbol_call_targets = chunk.meta.call_targets.clone();
    entry.symbol_callers = chunk.meta.callers.clone();
    entry.symbol_neighbors = chunk.meta.neighbors.clone();
    entry.symbol_parameters = if chunk.meta.parameters.is_empty() {
        None
    } else {
        Some(chunk.meta.parameters.clone())
    };
    entry.symbol_return = chunk.meta.returns.clone();
    entry.symbol_signature = chunk.meta.signature.clone();
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = IndexLayout::for_root(Path::new("/repo"));
        assert_eq!(layout.db_path, Path::new("/repo/.pampa/pampa.db"));
        assert_eq!(layout.chunks_dir, Path::new("/repo/.pampa/chunks"));
        assert_eq!(layout.codemap_path, Path::new("/repo/pampa.codemap.json"));
    }

    #[test]
    fn test_default_tags() {
        let chunks = crate::chunker::chunk_file("rust", "fn f() {}\n");
        let tags = default_tags("src/lib.rs", &chunks[0]);
        assert_eq!(tags, vec!["rust", "function", "src"]);

        let tags = default_tags("main.rs", &chunks[0]);
        assert_eq!(tags, vec!["rust", "function"]);
    }

    #[test]
    fn test_embedding_text_includes_signature_and_docs() {
        let src = "/// Greets.\nfn greet(name: &str) -> String {\n    format!(\"hi {name}\")\n}\n";
        let chunks = crate::chunker::chunk_file("rust", src);
        let text = embedding_text(&chunks[0]);
        assert!(text.starts_with("fn greet(name: &str) -> String"));
        assert!(text.contains("Greets."));
        assert!(text.contains("format!"));
    }
}
