//! OpenAI-compatible embeddings over HTTP.
//!
//! Works against api.openai.com or any compatible endpoint via
//! `PAMPAX_OPENAI_BASE_URL` (LM Studio, vLLM, Azure-style gateways).

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::error::{PampaxError, Result};

use super::EmbeddingProvider;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dims: usize,
    /// text-embedding-3 models accept a requested dimension count.
    send_dimensions: bool,
}

impl OpenAiProvider {
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.openai_api_key.clone().ok_or_else(|| {
            PampaxError::Config(
                "OpenAI provider selected but PAMPAX_OPENAI_API_KEY is not set".to_string(),
            )
        })?;
        let model = config
            .openai_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let send_dimensions = model.starts_with("text-embedding-3");
        let dims = config.dimensions.unwrap_or(DEFAULT_DIMENSIONS);

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: config
                .openai_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model,
            dims,
            send_dimensions,
        })
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f64>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn batch_size(&self) -> usize {
        64
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f64>> {
        let mut vectors = self.generate_embeddings(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| PampaxError::Embedding("OpenAI returned no embedding".to_string()))
    }

    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        if self.send_dimensions {
            body["dimensions"] = serde_json::json!(self.dims);
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PampaxError::Embedding(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PampaxError::Embedding(format!(
                "OpenAI API error {status}: {detail}"
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| PampaxError::Embedding(format!("OpenAI response parse error: {e}")))?;

        let mut items = parsed.data;
        items.sort_by_key(|item| item.index);

        let vectors: Vec<Vec<f64>> = items.into_iter().map(|item| item.embedding).collect();
        if vectors.len() != texts.len() {
            return Err(PampaxError::Embedding(format!(
                "OpenAI returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        for v in &vectors {
            if v.len() != self.dims {
                return Err(PampaxError::Embedding(format!(
                    "OpenAI returned dimension {}, expected {}",
                    v.len(),
                    self.dims
                )));
            }
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_api_key() {
        let cfg = Config::default();
        assert!(matches!(
            OpenAiProvider::from_config(&cfg),
            Err(PampaxError::Config(_))
        ));
    }

    #[test]
    fn test_defaults_and_overrides() {
        let cfg = Config {
            openai_api_key: Some("sk-test".into()),
            dimensions: Some(256),
            openai_base_url: Some("http://localhost:8080/v1/".into()),
            ..Config::default()
        };
        let provider = OpenAiProvider::from_config(&cfg).unwrap();
        assert_eq!(provider.dimensions(), 256);
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
        assert!(provider.send_dimensions);
    }
}
