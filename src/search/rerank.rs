//! Optional rerankers for the candidate tail of a search.
//!
//! `transformers` runs a local cross-encoder via fastembed;
//! `api` posts to a Cohere-style `/rerank` endpoint configured through
//! `PAMPAX_RERANKER_*`. Both return one relevance score per document,
//! aligned with the input order.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::error::{PampaxError, Result};

/// Which reranker, if any, the search run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RerankerKind {
    #[default]
    Off,
    Transformers,
    Api,
}

impl RerankerKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Some(RerankerKind::Off),
            "transformers" | "local" => Some(RerankerKind::Transformers),
            "api" => Some(RerankerKind::Api),
            _ => None,
        }
    }
}

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Relevance score per document, same order as `documents`.
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f64>>;
}

/// Build the configured reranker, or `None` for `Off`.
pub fn create_reranker(kind: RerankerKind, config: &Config) -> Result<Option<Box<dyn Reranker>>> {
    match kind {
        RerankerKind::Off => Ok(None),
        RerankerKind::Transformers => Ok(Some(Box::new(TransformersReranker::new()?))),
        RerankerKind::Api => Ok(Some(Box::new(ApiReranker::from_config(config)?))),
    }
}

/// Local cross-encoder reranker (fastembed / ONNX).
pub struct TransformersReranker {
    model: std::sync::Mutex<fastembed::TextRerank>,
}

impl TransformersReranker {
    pub fn new() -> Result<Self> {
        let cache_dir = crate::constants::get_global_models_cache_dir()
            .map_err(|e| PampaxError::Config(e.to_string()))?;
        let options = fastembed::RerankInitOptions::new(fastembed::RerankerModel::BGERerankerBase)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(false);
        let model = fastembed::TextRerank::try_new(options).map_err(|e| {
            PampaxError::Embedding(format!("failed to initialize reranker model: {e}"))
        })?;
        Ok(Self {
            model: std::sync::Mutex::new(model),
        })
    }
}

#[async_trait]
impl Reranker for TransformersReranker {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f64>> {
        let query = query.to_string();
        let docs: Vec<String> = documents.to_vec();
        let count = docs.len();

        tokio::task::block_in_place(|| {
            let mut model = self
                .model
                .lock()
                .map_err(|e| PampaxError::Internal(format!("reranker mutex poisoned: {e}")))?;
            let ranked = model
                .rerank(query, docs, false, None)
                .map_err(|e| PampaxError::Search(format!("rerank inference failed: {e}")))?;

            let mut scores = vec![0f64; count];
            for item in ranked {
                if item.index < count {
                    scores[item.index] = item.score as f64;
                }
            }
            Ok(scores)
        })
    }
}

/// HTTP reranker against a Cohere-style `/rerank` endpoint.
pub struct ApiReranker {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: Option<String>,
}

impl ApiReranker {
    pub fn from_config(config: &Config) -> Result<Self> {
        let url = config.reranker_url.clone().ok_or_else(|| {
            PampaxError::Config(
                "api reranker selected but PAMPAX_RERANKER_URL is not set".to_string(),
            )
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            url,
            api_key: config.reranker_api_key.clone(),
            model: config.reranker_model.clone(),
        })
    }
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankItem>,
}

#[derive(Deserialize)]
struct RerankItem {
    index: usize,
    relevance_score: f64,
}

#[async_trait]
impl Reranker for ApiReranker {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f64>> {
        let mut body = serde_json::json!({
            "query": query,
            "documents": documents,
        });
        if let Some(model) = &self.model {
            body["model"] = serde_json::json!(model);
        }

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PampaxError::Search(format!("rerank request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PampaxError::Search(format!(
                "rerank API error {status}: {detail}"
            )));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| PampaxError::Search(format!("rerank response parse error: {e}")))?;

        let mut scores = vec![0f64; documents.len()];
        for item in parsed.results {
            if item.index < documents.len() {
                scores[item.index] = item.relevance_score;
            }
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse() {
        assert_eq!(RerankerKind::parse("off"), Some(RerankerKind::Off));
        assert_eq!(
            RerankerKind::parse("Transformers"),
            Some(RerankerKind::Transformers)
        );
        assert_eq!(RerankerKind::parse("api"), Some(RerankerKind::Api));
        assert_eq!(RerankerKind::parse("other"), None);
    }

    #[test]
    fn test_api_reranker_requires_url() {
        assert!(matches!(
            ApiReranker::from_config(&Config::default()),
            Err(PampaxError::Config(_))
        ));
    }

    #[test]
    fn test_off_creates_none() {
        let reranker = create_reranker(RerankerKind::Off, &Config::default()).unwrap();
        assert!(reranker.is_none());
    }
}
