use async_trait::async_trait;

use crate::embed::{Embedding, EmbeddingProvider};
use crate::store::text::normalize as normalize_text;
use crate::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic, fast embedding for offline runs and tests.
///
/// Tokens are normalized the way the in-memory text search sees them
/// (lowercased, stopwords dropped, lightly stemmed), hashed into one of
/// `dimension` buckets with 64-bit FNV-1a and the counts L2-normalized, so
/// texts sharing vocabulary have high cosine similarity. No semantics beyond
/// word overlap. The hash is fixed, so stored vectors stay comparable across
/// builds.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    batch_size: usize,
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            batch_size: 64,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn embed(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];
        for token in normalize_text(text) {
            let bucket = (fnv1a(token.as_bytes()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        normalize(&mut vector);
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_passages(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        Ok(self.embed(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }

    fn model_name(&self) -> &str {
        "hashing-bow"
    }
}
