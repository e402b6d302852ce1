//! Engine configuration
//!
//! All settings have production defaults; binaries override them from flags
//! or environment variables and call [`EngineConfig::validate`] before
//! building anything.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use crate::{Error, Result};

/// Embedding dimension used by every store and provider in a deployment.
///
/// Matches `jina-embeddings-v3` and `bge-large-en-v1.5`.
pub const EMBEDDING_DIMENSION: usize = 1024;

/// Word-window settings for [`TextSegmenter`](crate::chunk::TextSegmenter).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap_size: usize,
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap_size: 80,
            min_chunk_size: 50,
        }
    }
}

/// Query-time settings for [`HybridRetriever`](crate::search::HybridRetriever).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    /// Results returned when the caller does not pass a size
    pub default_size: usize,
    /// Each sub-search fetches `size * candidate_multiplier` candidates
    pub candidate_multiplier: usize,
    /// Reciprocal Rank Fusion constant
    pub rrf_k: f64,
    /// Upper bound on each sub-search; a slow side counts as empty
    #[serde(with = "millis")]
    pub timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_size: 10,
            candidate_multiplier: 3,
            rrf_k: 60.0,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Indexing settings for [`IndexingOrchestrator`](crate::index::IndexingOrchestrator).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexingConfig {
    pub chunking: ChunkingConfig,
    pub retry: RetryPolicy,
}

/// Everything needed to assemble a [`SearchEngine`](crate::search::SearchEngine).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub dimension: usize,
    pub indexing: IndexingConfig,
    pub search: SearchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dimension: EMBEDDING_DIMENSION,
            indexing: IndexingConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reject settings that would fail later in less obvious ways.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::Configuration("embedding dimension must be positive".into()));
        }
        let chunking = &self.indexing.chunking;
        if chunking.chunk_size == 0 || chunking.overlap_size >= chunking.chunk_size {
            return Err(Error::Configuration(format!(
                "overlap size {} must be less than chunk size {}",
                chunking.overlap_size, chunking.chunk_size
            )));
        }
        if self.search.candidate_multiplier == 0 {
            return Err(Error::Configuration("candidate multiplier must be at least 1".into()));
        }
        if !(self.search.rrf_k.is_finite() && self.search.rrf_k >= 0.0) {
            return Err(Error::Configuration(format!(
                "rrf k must be a non-negative number, got {}",
                self.search.rrf_k
            )));
        }
        if self.indexing.retry.max_attempts == 0 {
            return Err(Error::Configuration("retry attempts must be at least 1".into()));
        }
        Ok(())
    }
}

pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
