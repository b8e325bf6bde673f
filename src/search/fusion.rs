//! Score fusion and deterministic ordering.
//!
//! Reciprocal Rank Fusion sums `1 / (k + rank)` across rankings with
//! k = 60. Symbol boosting multiplies the fused score by the chunk's
//! `path_weight` (default 1) and adds a flat bonus when query tokens hit
//! the symbol or tags. The final ordering is a total order: score
//! descending, then path ascending, then id ascending.

use std::collections::HashMap;

use crate::constants::RRF_K;

use super::bm25::tokenize;

/// Additive bonus when a query token matches the chunk symbol.
pub const SYMBOL_MATCH_BOOST: f64 = 0.08;
/// Additive bonus when a query token matches one of the chunk tags.
pub const TAG_MATCH_BOOST: f64 = 0.04;
/// Additive bonus for a confident intention-cache hit on the chunk SHA.
pub const INTENTION_BOOST: f64 = 0.1;
/// Minimum cached confidence for the intention boost to apply.
pub const INTENTION_MIN_CONFIDENCE: f64 = 0.6;
/// Confidence assigned when a decisive top hit seeds the intention cache.
pub const INTENTION_SEED_CONFIDENCE: f64 = 0.7;
/// A top hit seeds the cache only when it beats the runner-up by this factor.
pub const INTENTION_SEED_MARGIN: f64 = 1.5;

/// Cosine similarity, clamped to [-1, 1].
///
/// Zero-norm vectors and mismatched dimensions contribute 0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Fuse rankings with RRF. Each ranking is a list of chunk ids, best
/// first; ranks are 1-based.
pub fn rrf_fuse(rankings: &[Vec<String>]) -> HashMap<String, f64> {
    let mut fused: HashMap<String, f64> = HashMap::new();
    for ranking in rankings {
        for (rank, id) in ranking.iter().enumerate() {
            *fused.entry(id.clone()).or_insert(0.0) += 1.0 / (RRF_K + (rank + 1) as f64);
        }
    }
    fused
}

/// Symbol/tag boost for one chunk: additive part only.
pub fn symbol_tag_boost(query_tokens: &[String], symbol: &str, tags: &[String]) -> f64 {
    let mut boost = 0.0;
    if !symbol.is_empty() {
        let symbol_tokens = tokenize(symbol);
        let symbol_lower = symbol.to_lowercase();
        if query_tokens
            .iter()
            .any(|t| symbol_tokens.contains(t) || symbol_lower.contains(t.as_str()))
        {
            boost += SYMBOL_MATCH_BOOST;
        }
    }
    if !tags.is_empty() {
        let tag_lower: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
        if query_tokens.iter().any(|t| tag_lower.contains(t)) {
            boost += TAG_MATCH_BOOST;
        }
    }
    boost
}

/// Order results by score descending with deterministic tiebreaks:
/// path ascending, then id ascending.
pub fn sort_results<T, FScore, FPath, FId>(
    results: &mut [T],
    score: FScore,
    path: FPath,
    id: FId,
) where
    FScore: Fn(&T) -> f64,
    FPath: Fn(&T) -> &str,
    FId: Fn(&T) -> &str,
{
    results.sort_by(|a, b| {
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| path(a).cmp(path(b)))
            .then_with(|| id(a).cmp(id(b)))
    });
}
