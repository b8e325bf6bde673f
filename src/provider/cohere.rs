//! Cohere embeddings over HTTP.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::error::{PampaxError, Result};

use super::EmbeddingProvider;

const ENDPOINT: &str = "https://api.cohere.ai/v1/embed";
const DEFAULT_MODEL: &str = "embed-english-v3.0";
const DEFAULT_DIMENSIONS: usize = 1024;

pub struct CohereProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
}

impl CohereProvider {
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.cohere_api_key.clone().ok_or_else(|| {
            PampaxError::Config(
                "Cohere provider selected but PAMPAX_COHERE_API_KEY is not set".to_string(),
            )
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: config
                .cohere_model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            dims: config.dimensions.unwrap_or(DEFAULT_DIMENSIONS),
        })
    }
}

#[derive(Deserialize)]
struct CohereResponse {
    embeddings: Vec<Vec<f64>>,
}

#[async_trait]
impl EmbeddingProvider for CohereProvider {
    fn name(&self) -> &str {
        "cohere"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn batch_size(&self) -> usize {
        96
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f64>> {
        let mut vectors = self.generate_embeddings(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| PampaxError::Embedding("Cohere returned no embedding".to_string()))
    }

    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let response = self
            .client
            .post(ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "texts": texts,
                "input_type": "search_document",
                "truncate": "END",
            }))
            .send()
            .await
            .map_err(|e| PampaxError::Embedding(format!("Cohere request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PampaxError::Embedding(format!(
                "Cohere API error {status}: {detail}"
            )));
        }

        let parsed: CohereResponse = response
            .json()
            .await
            .map_err(|e| PampaxError::Embedding(format!("Cohere response parse error: {e}")))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(PampaxError::Embedding(format!(
                "Cohere returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                texts.len()
            )));
        }
        for v in &parsed.embeddings {
            if v.len() != self.dims {
                return Err(PampaxError::Embedding(format!(
                    "Cohere returned dimension {}, expected {}",
                    v.len(),
                    self.dims
                )));
            }
        }
        Ok(parsed.embeddings)
    }
}
