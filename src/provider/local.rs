//! Local transformer runtime via fastembed (ONNX).
//!
//! Models download once into the shared `~/.pampax/models/` cache and are
//! reused across repositories. Inference is CPU-bound and synchronous, so
//! batch calls run under `block_in_place` to stay off the async reactor.

use std::sync::Mutex;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::error::{PampaxError, Result};

use super::EmbeddingProvider;

const DIMENSIONS: usize = 384;

pub struct LocalProvider {
    model: Mutex<TextEmbedding>,
    dims: usize,
}

impl LocalProvider {
    pub fn new() -> Result<Self> {
        let cache_dir = crate::constants::get_global_models_cache_dir()
            .map_err(|e| PampaxError::Config(e.to_string()))?;

        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(false);
        let model = TextEmbedding::try_new(options).map_err(|e| {
            PampaxError::Embedding(format!("failed to initialize local embedding model: {e}"))
        })?;

        Ok(Self {
            model: Mutex::new(model),
            dims: DIMENSIONS,
        })
    }

    fn embed_blocking(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        let mut model = self
            .model
            .lock()
            .map_err(|e| PampaxError::Internal(format!("embedder mutex poisoned: {e}")))?;
        let embeddings = model
            .embed(texts, None)
            .map_err(|e| PampaxError::Embedding(format!("local inference failed: {e}")))?;
        Ok(embeddings
            .into_iter()
            .map(|v| v.into_iter().map(|f| f as f64).collect())
            .collect())
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f64>> {
        let mut vectors =
            tokio::task::block_in_place(|| self.embed_blocking(vec![text.to_string()]))?;
        vectors
            .pop()
            .ok_or_else(|| PampaxError::Embedding("local model returned no embedding".to_string()))
    }

    async fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let owned = texts.to_vec();
        tokio::task::block_in_place(|| self.embed_blocking(owned))
    }
}
