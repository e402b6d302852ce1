//! Text embedding providers
//!
//! The engine consumes embeddings; it does not compute them. Providers:
//!
//! - [`JinaEmbedder`]: `jina-embeddings-v3` over HTTP (1024 dimensions)
//! - [`HashingEmbedder`]: deterministic bag-of-words vectors for offline runs and tests
//! - `BgeEmbedder`: local BAAI/bge-large-en-v1.5 via fastembed (`bge` feature)
//!
//! # Usage
//!
//! ```ignore
//! use keynote_lib::embed::{EmbeddingProvider, JinaEmbedder};
//!
//! let embedder = JinaEmbedder::new(api_key, JinaConfig::default())?;
//!
//! // Embed passages (for indexing)
//! let vectors = embedder.embed_passages(&["Welcome to the summit".to_string()]).await?;
//!
//! // Embed query (for searching)
//! let query = embedder.embed_query("what did the chief guest say about AI?").await?;
//! ```

use async_trait::async_trait;

use crate::{Error, Result};

/// A vector embedding - fixed size array of floats
pub type Embedding = Vec<f32>;

/// Trait for text embedding providers
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed passages for indexing, preserving input order.
    ///
    /// Callers keep each call within [`max_batch_size`](Self::max_batch_size).
    async fn embed_passages(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a single query for searching
    ///
    /// Note: retrieval models often encode queries differently from passages.
    async fn embed_query(&self, text: &str) -> Result<Embedding>;

    /// Returns the embedding dimension
    fn dimension(&self) -> usize;

    /// Largest number of texts accepted by one [`embed_passages`](Self::embed_passages) call
    fn max_batch_size(&self) -> usize;

    /// Returns the model name/identifier
    fn model_name(&self) -> &str;
}

/// Fail with a configuration error unless the provider produces `expected`-sized vectors.
pub fn ensure_dimension<E: EmbeddingProvider + ?Sized>(provider: &E, expected: usize) -> Result<()> {
    if provider.dimension() != expected {
        return Err(Error::Configuration(format!(
            "embedding model {} produces {} dimensions but the store expects {}",
            provider.model_name(),
            provider.dimension(),
            expected
        )));
    }
    Ok(())
}

#[cfg(feature = "bge")]
mod bge;
mod hashing;
mod jina;

#[cfg(feature = "bge")]
pub use bge::*;
pub use hashing::*;
pub use jina::*;
