//! In-crate BM25 scoring over the DB-resident corpus.
//!
//! Classical Okapi BM25 with k1 = 1.2, b = 0.75. Documents are the
//! chunks' metadata text (symbol, path segments, tags, intent,
//! description, doc comments); chunk bodies never leave the store during
//! scoring. The index is rebuilt per query from the candidate set, which
//! is cheap at single-repository scale and keeps scoring deterministic.

use std::collections::HashMap;

/// Term-frequency weight saturation.
const K1: f64 = 1.2;
/// Length normalization strength.
const B: f64 = 0.75;

/// Lowercased tokens: alphanumeric runs, with camelCase boundaries split
/// so `getUser` matches `get user`.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if ch.is_uppercase() && prev_lower && !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = ch.is_lowercase() || ch.is_numeric();
            for lower in ch.to_lowercase() {
                current.push(lower);
            }
        } else {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = false;
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

struct Doc {
    term_freq: HashMap<String, usize>,
    len: usize,
}

/// BM25 index over one candidate set.
pub struct Bm25Index {
    docs: Vec<Doc>,
    doc_freq: HashMap<String, usize>,
    avgdl: f64,
}

impl Bm25Index {
    /// Build from document texts, in candidate order.
    pub fn build(texts: &[String]) -> Self {
        let mut docs = Vec::with_capacity(texts.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;

        for text in texts {
            let tokens = tokenize(text);
            total_len += tokens.len();
            let mut term_freq: HashMap<String, usize> = HashMap::new();
            for token in tokens.iter() {
                *term_freq.entry(token.clone()).or_insert(0) += 1;
            }
            for term in term_freq.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            docs.push(Doc {
                len: tokens.len(),
                term_freq,
            });
        }

        let avgdl = if docs.is_empty() {
            0.0
        } else {
            total_len as f64 / docs.len() as f64
        };

        Self {
            docs,
            doc_freq,
            avgdl,
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = *self.doc_freq.get(term).unwrap_or(&0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// BM25 score of the query against document `idx`.
    pub fn score(&self, query_tokens: &[String], idx: usize) -> f64 {
        let doc = &self.docs[idx];
        if doc.len == 0 || self.avgdl == 0.0 {
            return 0.0;
        }

        let mut score = 0.0;
        for term in query_tokens {
            let tf = *doc.term_freq.get(term).unwrap_or(&0) as f64;
            if tf == 0.0 {
                continue;
            }
            let idf = self.idf(term);
            let norm = tf * (K1 + 1.0) / (tf + K1 * (1.0 - B + B * doc.len as f64 / self.avgdl));
            score += idf * norm;
        }
        score
    }

    /// Scores for every document with a positive score, sorted descending
    /// (ties by ascending document index for determinism).
    pub fn ranked(&self, query: &str) -> Vec<(usize, f64)> {
        let query_tokens = tokenize(query);
        let mut scored: Vec<(usize, f64)> = (0..self.docs.len())
            .map(|idx| (idx, self.score(&query_tokens, idx)))
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_splits_camel_and_snake() {
        assert_eq!(tokenize("getUserById"), vec!["get", "user", "by", "id"]);
        assert_eq!(tokenize("get_user_by_id"), vec!["get", "user", "by", "id"]);
        assert_eq!(tokenize("HTTPServer2"), vec!["httpserver2"]);
        assert_eq!(tokenize("  spaces\tand\npunct!  "), vec!["spaces", "and", "punct"]);
    }

    #[test]
    fn test_matching_doc_ranks_first() {
        let docs = vec![
            "fn get_user_by_id db lookup".to_string(),
            "fn delete_user removes a row".to_string(),
            "struct ConnectionPool settings".to_string(),
        ];
        let index = Bm25Index::build(&docs);
        let ranked = index.ranked("get user");

        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].0, 0);
        assert!(ranked[0].1 > 0.0);
    }

    #[test]
    fn test_no_match_yields_empty_ranking() {
        let docs = vec!["alpha beta".to_string(), "gamma delta".to_string()];
        let index = Bm25Index::build(&docs);
        assert!(index.ranked("zeta").is_empty());
    }

    #[test]
    fn test_rare_terms_outweigh_common_ones() {
        let docs = vec![
            "parse config parse config parse".to_string(),
            "parse special_marker config".to_string(),
            "parse config values".to_string(),
        ];
        let index = Bm25Index::build(&docs);
        let ranked = index.ranked("special_marker");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0, 1);
    }

    #[test]
    fn test_deterministic_ordering() {
        let docs: Vec<String> = (0..20).map(|i| format!("common token doc{i}")).collect();
        let index = Bm25Index::build(&docs);
        let first = index.ranked("common token");
        let second = index.ranked("common token");
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_corpus() {
        let index = Bm25Index::build(&[]);
        assert!(index.is_empty());
        assert!(index.ranked("anything").is_empty());
    }
}
