//! Ollama embeddings over the local HTTP API.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::error::{PampaxError, Result};

use super::EmbeddingProvider;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "nomic-embed-text";
const DEFAULT_DIMENSIONS: usize = 768;

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dims: usize,
}

impl OllamaProvider {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config
                .ollama_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config
                .ollama_model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            dims: config.dimensions.unwrap_or(DEFAULT_DIMENSIONS),
        })
    }
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f64>,
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn batch_size(&self) -> usize {
        // The /api/embeddings endpoint is single-prompt; keep batches
        // small so cancellation stays responsive.
        16
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f64>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&serde_json::json!({
                "model": self.model,
                "prompt": text,
            }))
            .send()
            .await
            .map_err(|e| PampaxError::Embedding(format!("Ollama request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PampaxError::Embedding(format!(
                "Ollama API error {status}: {detail}"
            )));
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| PampaxError::Embedding(format!("Ollama response parse error: {e}")))?;

        if parsed.embedding.len() != self.dims {
            return Err(PampaxError::Embedding(format!(
                "Ollama returned dimension {}, expected {} (set PAMPAX_DIMENSIONS to match the model)",
                parsed.embedding.len(),
                self.dims
            )));
        }
        Ok(parsed.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let provider = OllamaProvider::from_config(&Config::default()).unwrap();
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(provider.dimensions(), DEFAULT_DIMENSIONS);
        assert_eq!(provider.name(), "ollama");
    }
}
