use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::embed::{Embedding, EmbeddingProvider};
use crate::{Error, Result};

/// BGE embedder using BAAI/bge-large-en-v1.5.
///
/// Uses fastembed for ONNX-based inference. This model produces 1024-dimensional
/// embeddings and supports up to 512 tokens per input. Inference runs on the
/// blocking thread pool.
#[derive(Clone)]
pub struct BgeEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl BgeEmbedder {
    /// Create a new BGE embedder.
    ///
    /// Downloads the model on first use (~1.2GB).
    pub fn new() -> Result<Self> {
        let opts = InitOptions::new(EmbeddingModel::BGELargeENV15)
            .with_show_download_progress(true);

        TextEmbedding::try_new(opts)
            .map(|model| Self {
                model: Arc::new(Mutex::new(model)),
            })
            .map_err(|e| Error::Configuration(format!("failed to load BGE model: {e}")))
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| Error::embedding("BGE model lock poisoned"))?;
            model
                .embed(texts, None)
                .map_err(|e| Error::embedding(e.to_string()))
        })
        .await
        .map_err(|e| Error::embedding(format!("embedding task failed: {e}")))?
    }
}

#[async_trait]
impl EmbeddingProvider for BgeEmbedder {
    async fn embed_passages(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.run(texts.to_vec()).await
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        // bge expects this prompt prefix on queries, never on passages
        let query_text = format!("Represent this sentence for searching relevant passages: {text}");

        self.run(vec![query_text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("model returned no embeddings"))
    }

    fn dimension(&self) -> usize {
        1024
    }

    fn max_batch_size(&self) -> usize {
        256
    }

    fn model_name(&self) -> &str {
        "BAAI/bge-large-en-v1.5"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires model download, run with: cargo test --features bge -- --ignored
    async fn test_query_closer_to_relevant_passage() {
        let embedder = BgeEmbedder::new().unwrap();
        let passages = vec![
            "The chief guest spoke about solar energy adoption in rural schools.".to_string(),
            "Lunch will be served in the east wing after the session.".to_string(),
        ];
        let vectors = embedder.embed_passages(&passages).await.unwrap();
        let query = embedder.embed_query("renewable energy in education").await.unwrap();

        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        assert_eq!(query.len(), 1024);
        assert!(dot(&query, &vectors[0]) > dot(&query, &vectors[1]));
    }
}
