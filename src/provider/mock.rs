//! Deterministic in-process provider for tests.
//!
//! Vectors are derived from token hashes (FNV-1a, implemented inline so
//! the output is stable across platforms and toolchains) and normalized,
//! so similar texts share features without any model or network.

use async_trait::async_trait;

use crate::error::{PampaxError, Result};

use super::EmbeddingProvider;

pub struct MockProvider {
    dims: usize,
    fail_marker: Option<String>,
}

impl MockProvider {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            fail_marker: None,
        }
    }

    /// A provider that errors for any text containing `marker`, for
    /// exercising retry and per-chunk fallback paths.
    pub fn failing_on(dims: usize, marker: &str) -> Self {
        Self {
            dims,
            fail_marker: Some(marker.to_string()),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f64> {
        let mut v = vec![0f64; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let h = fnv1a(token.to_lowercase().as_bytes());
            v[(h as usize) % self.dims] += 1.0;
        }
        let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn batch_size(&self) -> usize {
        4
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f64>> {
        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                return Err(PampaxError::Embedding(format!(
                    "mock provider refuses text containing {marker:?}"
                )));
            }
        }
        Ok(self.embed_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_is_deterministic() {
        let p = MockProvider::new(32);
        let a = p.generate_embedding("login handler").await.unwrap();
        let b = p.generate_embedding("login handler").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn test_mock_vectors_are_normalized() {
        let p = MockProvider::new(32);
        let v = p.generate_embedding("some text here").await.unwrap();
        let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_similar_texts_are_closer() {
        let p = MockProvider::new(64);
        let auth1 = p.generate_embedding("authenticate user login").await.unwrap();
        let auth2 = p.generate_embedding("user login authenticate").await.unwrap();
        let other = p.generate_embedding("parse yaml config file").await.unwrap();

        let dot = |a: &[f64], b: &[f64]| -> f64 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(dot(&auth1, &auth2) > dot(&auth1, &other));
    }
}
