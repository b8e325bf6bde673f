//! Hybrid search engine.
//!
//! The pipeline of one query:
//!
//! 1. embed the query through the configured provider (cached),
//! 2. score candidates by cosine similarity and, when enabled, BM25 over
//!    the DB-resident metadata text,
//! 3. fuse the two rankings with RRF (k = 60) when hybrid mode is on,
//! 4. apply symbol/tag boosting,
//! 5. optionally rerank the top 3×limit candidates,
//! 6. order deterministically (score desc, path asc, id asc) and return
//!    the top `limit`, fetching chunk content from the store per hit.
//!
//! The engine reads only from the database; the chunk store is touched
//! for content on final hits (and reranker input). When the provider is
//! unreachable and BM25 is enabled, the search degrades to lexical-only
//! with a warning instead of failing.

pub mod bm25;
pub mod fusion;
pub mod rerank;

pub use rerank::RerankerKind;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::constants::{DEFAULT_SEARCH_LIMIT, RERANK_CANDIDATE_FACTOR};
use crate::db::StoredChunk;
use crate::error::{PampaxError, Result};
use crate::provider::EmbeddingService;
use crate::AppContext;

/// Options for one search call.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    /// Glob patterns over the relative file path; any match includes.
    pub path_glob: Vec<String>,
    /// Language filter; empty means all languages.
    pub langs: Vec<String>,
    /// Tag filter; every listed tag must be present on the chunk.
    pub tags: Vec<String>,
    pub hybrid: bool,
    pub bm25: bool,
    pub symbol_boost: bool,
    pub reranker: RerankerKind,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            limit: DEFAULT_SEARCH_LIMIT,
            path_glob: Vec::new(),
            langs: Vec::new(),
            tags: Vec::new(),
            hybrid: true,
            bm25: true,
            symbol_boost: true,
            reranker: RerankerKind::Off,
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub sha: String,
    pub path: String,
    pub lang: String,
    pub chunk_type: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    pub symbol: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Search results plus non-fatal problems encountered on the way.
#[derive(Debug, Default, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub warnings: Vec<String>,
}

/// Normalized form of a query used for learning signals.
pub fn normalize_query(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut last_space = true;
    for ch in query.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

/// Run one search against the context's database and store.
pub async fn search(
    ctx: &AppContext,
    query: &str,
    options: &SearchOptions,
) -> Result<SearchOutcome> {
    let query = query.trim();
    if query.is_empty() {
        return Err(PampaxError::InvalidInput("search query is empty".to_string()));
    }
    let normalized = normalize_query(query);

    let globs = compile_globs(&options.path_glob)?;
    let candidates: Vec<StoredChunk> = ctx
        .db
        .all_chunks()?
        .into_iter()
        .filter(|c| passes_filters(c, options, &globs))
        .collect();

    // Learning signal: every query bumps its pattern counter, hit or miss.
    if let Err(e) = ctx.db.record_query_pattern(&normalized) {
        debug!("query pattern not recorded: {e}");
    }

    if candidates.is_empty() || options.limit == 0 {
        return Ok(SearchOutcome::default());
    }

    let mut outcome = SearchOutcome::default();

    // Query embedding; degrade to lexical-only when possible.
    let service = EmbeddingService::new(ctx.provider.clone(), &ctx.config);
    let query_embedding = match service.embed_query(query).await {
        Ok(v) => Some(v),
        Err(e) => {
            if options.bm25 {
                warn!("query embedding failed, degrading to BM25 only: {e}");
                outcome
                    .warnings
                    .push(format!("vector search unavailable: {e}"));
                None
            } else {
                return Err(PampaxError::Embedding(format!(
                    "query embedding failed and BM25 is disabled: {e}"
                )));
            }
        }
    };

    // Vector scores: cosine against provider/dimension-compatible chunks.
    let provider_name = ctx.provider.name().to_string();
    let vector_scores: Vec<f64> = match &query_embedding {
        Some(qv) => candidates
            .par_iter()
            .map(|c| vector_score(c, qv, &provider_name))
            .collect(),
        None => vec![0.0; candidates.len()],
    };

    let vector_ranking = ranked_ids(&candidates, &vector_scores);

    // BM25 over DB-resident metadata text.
    let bm25_ranked = if options.bm25 {
        let docs: Vec<String> = candidates.iter().map(metadata_text).collect();
        bm25::Bm25Index::build(&docs).ranked(query)
    } else {
        Vec::new()
    };
    let bm25_ranking: Vec<String> = bm25_ranked
        .iter()
        .map(|(idx, _)| candidates[*idx].id.clone())
        .collect();

    // Fusion.
    let use_rrf = options.hybrid && options.bm25 && query_embedding.is_some();
    let fused = fusion::rrf_fuse(&[vector_ranking, bm25_ranking]);
    let bm25_by_id: std::collections::HashMap<&str, f64> = bm25_ranked
        .iter()
        .map(|(idx, score)| (candidates[*idx].id.as_str(), *score))
        .collect();

    let query_tokens = bm25::tokenize(query);
    let intention = ctx.db.intention_for(&normalized)?;

    let mut results: Vec<SearchResult> = Vec::new();
    for (idx, chunk) in candidates.iter().enumerate() {
        let base = if use_rrf {
            match fused.get(&chunk.id) {
                Some(s) => *s,
                None => continue,
            }
        } else if query_embedding.is_some() {
            vector_scores[idx]
        } else {
            match bm25_by_id.get(chunk.id.as_str()) {
                Some(s) => *s,
                None => continue,
            }
        };

        let score = if options.symbol_boost {
            // path_weight defaults to 1; the codemap can raise it for
            // paths that repeatedly satisfy queries.
            let mut boosted = base * 1.0
                + fusion::symbol_tag_boost(&query_tokens, &chunk.symbol, &chunk.tags);
            if let Some(hit) = &intention {
                if hit.target_sha == chunk.sha
                    && hit.confidence >= fusion::INTENTION_MIN_CONFIDENCE
                {
                    boosted += fusion::INTENTION_BOOST;
                }
            }
            boosted
        } else {
            base
        };

        let (start_line, end_line) = match chunk.line_range() {
            Some((s, e)) => (Some(s), Some(e)),
            None => (None, None),
        };

        results.push(SearchResult {
            id: chunk.id.clone(),
            sha: chunk.sha.clone(),
            path: chunk.file_path.clone(),
            lang: chunk.lang.clone(),
            chunk_type: chunk.chunk_type.clone(),
            score,
            start_line,
            end_line,
            symbol: if chunk.symbol.is_empty() {
                None
            } else {
                Some(chunk.symbol.clone())
            },
            tags: chunk.tags.clone(),
            content: None,
        });
    }

    fusion::sort_results(&mut results, |r| r.score, |r| r.path.as_str(), |r| r.id.as_str());

    // Optional reranking over the candidate tail.
    if options.reranker != RerankerKind::Off {
        if let Some(reranker) = rerank::create_reranker(options.reranker, &ctx.config)? {
            let take = (options.limit * RERANK_CANDIDATE_FACTOR).max(options.limit);
            results.truncate(take);

            let docs: Vec<String> = results
                .iter()
                .map(|r| rerank_document(ctx, r))
                .collect();
            let scores = reranker.rerank(query, &docs).await?;
            for (result, score) in results.iter_mut().zip(scores.into_iter()) {
                result.score = score;
            }
            // Stable: equal rerank scores keep their pre-rerank order.
            results.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    results.truncate(options.limit);

    // Content retrieval per hit; a missing chunk file is fatal for that
    // hit only.
    let mut delivered = Vec::with_capacity(results.len());
    for mut result in results {
        match ctx.store.read_chunk_text(&result.sha) {
            Ok(text) => {
                result.content = Some(text);
                delivered.push(result);
            }
            Err(e) => {
                warn!(sha = %result.sha, "chunk content unavailable: {e}");
                outcome
                    .warnings
                    .push(format!("result {} dropped: {e}", result.id));
            }
        }
    }

    // Learning signals: a confirmed hit reinforces the cached intention,
    // and a decisive top hit seeds the cache for a first-seen query.
    match &intention {
        Some(hit) => {
            if delivered.iter().any(|r| r.sha == hit.target_sha) {
                let _ = ctx
                    .db
                    .upsert_intention(query, &normalized, &hit.target_sha, hit.confidence);
            }
        }
        None => {
            if let Some(target_sha) = decisive_top_sha(&delivered) {
                let _ = ctx.db.upsert_intention(
                    query,
                    &normalized,
                    &target_sha,
                    fusion::INTENTION_SEED_CONFIDENCE,
                );
            }
        }
    }

    outcome.results = delivered;
    Ok(outcome)
}

/// SHA of the top result when it answers the query decisively: positive
/// score and clear of the runner-up by [`fusion::INTENTION_SEED_MARGIN`].
fn decisive_top_sha(results: &[SearchResult]) -> Option<String> {
    let top = results.first()?;
    if top.score <= 0.0 {
        return None;
    }
    match results.get(1) {
        Some(second) if top.score < second.score * fusion::INTENTION_SEED_MARGIN => None,
        _ => Some(top.sha.clone()),
    }
}

fn compile_globs(patterns: &[String]) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| PampaxError::InvalidInput(format!("bad path_glob {p:?}: {e}")))
        })
        .collect()
}

fn passes_filters(
    chunk: &StoredChunk,
    options: &SearchOptions,
    globs: &[glob::Pattern],
) -> bool {
    if !globs.is_empty() && !globs.iter().any(|g| g.matches(&chunk.file_path)) {
        return false;
    }
    if !options.langs.is_empty()
        && !options
            .langs
            .iter()
            .any(|l| l.eq_ignore_ascii_case(&chunk.lang))
    {
        return false;
    }
    if !options.tags.is_empty() {
        let chunk_tags: Vec<String> = chunk.tags.iter().map(|t| t.to_lowercase()).collect();
        if !options
            .tags
            .iter()
            .all(|t| chunk_tags.contains(&t.to_lowercase()))
        {
            return false;
        }
    }
    true
}

fn vector_score(chunk: &StoredChunk, query: &[f64], provider_name: &str) -> f64 {
    let embedding = match &chunk.embedding {
        Some(v) => v,
        None => return 0.0,
    };
    // Only provider- and dimension-compatible vectors participate;
    // mismatches are silently skipped.
    if chunk.embedding_provider.as_deref() != Some(provider_name) {
        return 0.0;
    }
    fusion::cosine_similarity(query, embedding)
}

/// Ranking of candidate ids by vector score, best first, positive only.
fn ranked_ids(candidates: &[StoredChunk], scores: &[f64]) -> Vec<String> {
    let mut order: Vec<usize> = (0..candidates.len()).filter(|i| scores[*i] > 0.0).collect();
    order.sort_by(|a, b| {
        scores[*b]
            .partial_cmp(&scores[*a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| candidates[*a].file_path.cmp(&candidates[*b].file_path))
            .then_with(|| candidates[*a].id.cmp(&candidates[*b].id))
    });
    order.into_iter().map(|i| candidates[i].id.clone()).collect()
}

/// Searchable text for BM25: DB-resident fields only.
fn metadata_text(chunk: &StoredChunk) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !chunk.symbol.is_empty() {
        parts.push(chunk.symbol.clone());
    }
    parts.push(chunk.file_path.replace(['/', '.'], " "));
    if !chunk.tags.is_empty() {
        parts.push(chunk.tags.join(" "));
    }
    if let Some(intent) = &chunk.intent {
        parts.push(intent.clone());
    }
    if let Some(desc) = &chunk.description {
        parts.push(desc.clone());
    }
    if let Some(doc) = &chunk.doc_comments {
        parts.push(doc.clone());
    }
    if !chunk.variables_used.is_empty() {
        parts.push(chunk.variables_used.join(" "));
    }
    parts.join("\n")
}

/// Document text handed to a reranker: chunk content when the store has
/// it, metadata text otherwise.
fn rerank_document(ctx: &AppContext, result: &SearchResult) -> String {
    match ctx.store.read_chunk_text(&result.sha) {
        Ok(text) => text,
        Err(_) => {
            let symbol = result.symbol.clone().unwrap_or_default();
            format!("{symbol}\n{}\n{}", result.path, result.tags.join(" "))
        }
    }
}
