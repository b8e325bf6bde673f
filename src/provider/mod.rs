//! Embedding provider abstraction.
//!
//! The indexer and search engine only ever see [`EmbeddingProvider`]:
//! one text in, one vector out, plus the provider's name and dimension
//! count. Concrete adapters cover an OpenAI-compatible HTTP API, Ollama,
//! Cohere, and a local transformer runtime; `auto` selection prefers them
//! in that order based on which credentials are configured.

pub mod cohere;
pub mod local;
pub mod mock;
pub mod ollama;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use moka::sync::Cache;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, ProviderChoice};
use crate::constants::{check_shutdown, DEFAULT_EMBED_BATCH_SIZE};
use crate::error::{PampaxError, Result};

/// An embedding-producing adapter.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Human-readable provider name ("openai", "ollama", ...).
    fn name(&self) -> &str;

    /// True output dimension of this provider's vectors.
    fn dimensions(&self) -> usize;

    /// Preferred number of texts per batch call.
    fn batch_size(&self) -> usize {
        DEFAULT_EMBED_BATCH_SIZE
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f64>>;

    /// Batch variant; the default loops over single calls.
    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.generate_embedding(text).await?);
        }
        Ok(out)
    }
}

/// Construct the provider selected by the configuration.
///
/// `auto` prefers OpenAI when an API key is present, then Cohere, then
/// Ollama when its base URL is set, then the local runtime. The choice is
/// logged so index artifacts can be traced back to their provider.
pub fn create_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let choice = match config.provider {
        ProviderChoice::Auto => {
            let resolved = if config.openai_api_key.is_some() {
                ProviderChoice::OpenAi
            } else if config.cohere_api_key.is_some() {
                ProviderChoice::Cohere
            } else if config.ollama_base_url.is_some() {
                ProviderChoice::Ollama
            } else {
                ProviderChoice::Local
            };
            info!(provider = resolved.as_str(), "auto-selected embedding provider");
            resolved
        }
        explicit => explicit,
    };

    match choice {
        ProviderChoice::OpenAi => Ok(Arc::new(openai::OpenAiProvider::from_config(config)?)),
        ProviderChoice::Cohere => Ok(Arc::new(cohere::CohereProvider::from_config(config)?)),
        ProviderChoice::Ollama => Ok(Arc::new(ollama::OllamaProvider::from_config(config)?)),
        ProviderChoice::Local => Ok(Arc::new(local::LocalProvider::new()?)),
        ProviderChoice::Auto => unreachable!("auto resolved above"),
    }
}

/// Outcome of embedding one batch element.
pub type MaybeEmbedding = Option<Vec<f64>>;

/// Rough chars-per-token ratio used for the `PAMPAX_MAX_TOKENS` hint.
const CHARS_PER_TOKEN: usize = 4;

/// Provider wrapper adding a query cache, batching, retry, rate limiting
/// and the max-token truncation hint.
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    query_cache: Cache<String, Arc<Vec<f64>>>,
    rate_limit_ms: Option<u64>,
    max_chars: Option<usize>,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &Config) -> Self {
        // Query reuse is high in interactive sessions; cap the cache by
        // approximate memory instead of entry count.
        let query_cache = Cache::builder()
            .max_capacity(50 * 1024 * 1024)
            .weigher(|key: &String, value: &Arc<Vec<f64>>| {
                (key.len() + value.len() * std::mem::size_of::<f64>()) as u32
            })
            .build();

        Self {
            provider,
            query_cache,
            rate_limit_ms: config.rate_limit_ms,
            max_chars: config.max_tokens.map(|t| t.saturating_mul(CHARS_PER_TOKEN)),
        }
    }

    /// Apply the truncation hint on a char boundary.
    fn clip<'a>(&self, text: &'a str) -> std::borrow::Cow<'a, str> {
        match self.max_chars {
            Some(max) if text.chars().count() > max => {
                std::borrow::Cow::Owned(text.chars().take(max).collect())
            }
            _ => std::borrow::Cow::Borrowed(text),
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Embed a query string, consulting the cache first.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f64>> {
        if let Some(cached) = self.query_cache.get(query) {
            return Ok(cached.as_ref().clone());
        }
        let embedding = self.provider.generate_embedding(&self.clip(query)).await?;
        self.query_cache
            .insert(query.to_string(), Arc::new(embedding.clone()));
        Ok(embedding)
    }

    /// Embed many texts in provider-sized batches.
    ///
    /// A failed batch is retried once; if the retry fails too, each text
    /// falls back to a single call. Texts that still fail come back as
    /// `None` with a message in the error list, so the caller can persist
    /// the chunk without an embedding instead of aborting the run.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<(Vec<MaybeEmbedding>, Vec<String>)> {
        let mut results: Vec<MaybeEmbedding> = Vec::with_capacity(texts.len());
        let mut errors: Vec<String> = Vec::new();
        let batch_size = self.provider.batch_size().max(1);
        let texts: Vec<String> = texts.iter().map(|t| self.clip(t).into_owned()).collect();

        for batch in texts.chunks(batch_size) {
            if check_shutdown(cancel) {
                return Err(PampaxError::Internal("embedding cancelled".to_string()));
            }

            match self.embed_batch_with_retry(batch).await {
                Ok(vectors) => results.extend(vectors.into_iter().map(Some)),
                Err(batch_err) => {
                    warn!("embedding batch failed twice, falling back per-text: {batch_err}");
                    for text in batch {
                        if check_shutdown(cancel) {
                            return Err(PampaxError::Internal("embedding cancelled".to_string()));
                        }
                        match self.provider.generate_embedding(text).await {
                            Ok(v) => results.push(Some(v)),
                            Err(e) => {
                                errors.push(e.to_string());
                                results.push(None);
                            }
                        }
                    }
                }
            }

            if let Some(ms) = self.rate_limit_ms {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
            }
        }

        Ok((results, errors))
    }

    async fn embed_batch_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f64>>> {
        match self.provider.generate_embeddings(batch).await {
            Ok(v) => Ok(v),
            Err(first) => {
                warn!("embedding batch failed, retrying once: {first}");
                self.provider.generate_embeddings(batch).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockProvider;
    use super::*;

    #[tokio::test]
    async fn test_query_cache_returns_same_vector() {
        let service = EmbeddingService::new(Arc::new(MockProvider::new(16)), &Config::default());
        let a = service.embed_query("find auth").await.unwrap();
        let b = service.embed_query("find auth").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[tokio::test]
    async fn test_embed_batch_aligns_results() {
        let service = EmbeddingService::new(Arc::new(MockProvider::new(8)), &Config::default());
        let texts: Vec<String> = (0..5).map(|i| format!("text {i}")).collect();
        let (results, errors) = service
            .embed_batch(&texts, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 5);
        assert!(errors.is_empty());
        assert!(results.iter().all(|r| r.is_some()));
    }

    #[tokio::test]
    async fn test_embed_batch_fallback_marks_failures() {
        let service = EmbeddingService::new(
            Arc::new(MockProvider::failing_on(8, "poison")),
            &Config::default(),
        );
        let texts = vec!["good".to_string(), "poison".to_string()];
        let (results, errors) = service
            .embed_batch(&texts, &CancellationToken::new())
            .await
            .unwrap();
        assert!(results[0].is_some());
        assert!(results[1].is_none());
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn test_embed_batch_cancelled() {
        let service = EmbeddingService::new(Arc::new(MockProvider::new(8)), &Config::default());
        let token = CancellationToken::new();
        token.cancel();
        let texts = vec!["x".to_string()];
        assert!(service.embed_batch(&texts, &token).await.is_err());
    }

    #[test]
    fn test_auto_selection_prefers_openai() {
        let mut cfg = Config {
            openai_api_key: Some("sk-test".into()),
            cohere_api_key: Some("co-test".into()),
            ..Config::default()
        };
        let provider = create_provider(&cfg).unwrap();
        assert_eq!(provider.name(), "openai");

        cfg.openai_api_key = None;
        let provider = create_provider(&cfg).unwrap();
        assert_eq!(provider.name(), "cohere");

        cfg.cohere_api_key = None;
        cfg.ollama_base_url = Some("http://localhost:11434".into());
        let provider = create_provider(&cfg).unwrap();
        assert_eq!(provider.name(), "ollama");
    }
}
