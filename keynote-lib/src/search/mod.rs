//! High-level search interface
//!
//! Lexical and vector searchers rank stored chunks independently;
//! [`FusionRanker`] merges their rankings with Reciprocal Rank Fusion and
//! [`HybridRetriever`] runs both concurrently. [`SearchEngine`] ties an
//! embedding provider and a store together behind one indexing + search API.
//!
//! # Usage
//!
//! ```ignore
//! use keynote_lib::search::{SearchEngine, SearchMode, SearchRequest};
//!
//! let engine = SearchEngine::new(provider, store, EngineConfig::default())?;
//! engine.index(&event, &transcript).await;
//!
//! // Hybrid search, query embedded by the engine's provider
//! let hits = engine.query("solar energy in schools", 5, None, SearchMode::Hybrid).await?;
//!
//! // Caller-supplied embedding, restricted to one event
//! let request = SearchRequest::new("solar energy")
//!     .with_embedding(query_vector)
//!     .with_events(vec![event_id]);
//! let hits = engine.search(&request).await?;
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::chunk::ChunkMetadata;
use crate::config::EngineConfig;
use crate::embed::{ensure_dimension, Embedding, EmbeddingProvider};
use crate::event::{EventContext, EventRecord};
use crate::index::{IndexingOrchestrator, IndexingResult};
use crate::store::{ChunkStore, ScoredChunk};
use crate::{Error, Result};

mod fusion;
mod hybrid;
mod lexical;
mod vector;

pub use fusion::*;
pub use hybrid::*;
pub use lexical::*;
pub use vector::*;

/// Which ranking produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Lexical,
    Vector,
    Hybrid,
}

/// One search result.
///
/// `text` is the chunk's raw transcript text, without the context header.
/// `score` is a text rank for lexical hits, `1 - cosine distance` for vector
/// hits and an RRF sum for hybrid hits; scores are only comparable within
/// one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub chunk_id: Uuid,
    pub event_id: Uuid,
    pub chunk_index: usize,
    pub text: String,
    pub score: f64,
    pub source: SearchSource,
    pub metadata: ChunkMetadata,
    /// 0-based position in the lexical ranking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_rank: Option<usize>,
    /// 0-based position in the vector ranking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_rank: Option<usize>,
}

impl SearchHit {
    pub(crate) fn from_scored(scored: ScoredChunk, source: SearchSource, rank: usize) -> Self {
        let (lexical_rank, vector_rank) = match source {
            SearchSource::Lexical => (Some(rank), None),
            SearchSource::Vector => (None, Some(rank)),
            SearchSource::Hybrid => (None, None),
        };
        let chunk = scored.chunk;
        Self {
            chunk_id: chunk.id,
            event_id: chunk.event_id,
            chunk_index: chunk.chunk_index,
            text: chunk.raw_text,
            score: f64::from(scored.score),
            source,
            metadata: chunk.metadata,
            lexical_rank,
            vector_rank,
        }
    }
}

/// Retrieval strategy for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Lexical,
    Vector,
    #[default]
    Hybrid,
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexical" => Ok(Self::Lexical),
            "vector" => Ok(Self::Vector),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(Error::Validation(format!(
                "unknown search mode {other:?}, expected lexical, vector or hybrid"
            ))),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lexical => "lexical",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
        })
    }
}

/// A search call: query text, optional precomputed embedding, result size,
/// optional event filter and mode.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub embedding: Option<Embedding>,
    pub size: usize,
    pub event_ids: Option<Vec<Uuid>>,
    pub mode: SearchMode,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            embedding: None,
            size: 10,
            event_ids: None,
            mode: SearchMode::default(),
        }
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_events(mut self, event_ids: Vec<Uuid>) -> Self {
        self.event_ids = Some(event_ids);
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Event filter as a slice, `None` meaning every event.
    pub fn filter(&self) -> Option<&[Uuid]> {
        self.event_ids.as_deref()
    }
}

/// Indexing and retrieval over one embedding provider and one store.
pub struct SearchEngine<E: EmbeddingProvider + ?Sized, S: ChunkStore + ?Sized> {
    provider: Arc<E>,
    store: Arc<S>,
    indexer: IndexingOrchestrator<E, S>,
    retriever: HybridRetriever<S>,
    config: EngineConfig,
}

impl<E: EmbeddingProvider + ?Sized, S: ChunkStore + ?Sized> SearchEngine<E, S> {
    /// Build an engine, failing when the configuration is invalid or the
    /// provider, store and configuration disagree on the embedding dimension.
    pub fn new(provider: Arc<E>, store: Arc<S>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        ensure_dimension(provider.as_ref(), config.dimension)?;
        if store.dimension() != config.dimension {
            return Err(Error::Configuration(format!(
                "store holds {}-dimensional embeddings, engine configured for {}",
                store.dimension(),
                config.dimension
            )));
        }

        let indexer = IndexingOrchestrator::new(
            Arc::clone(&provider),
            Arc::clone(&store),
            &config.indexing,
        )?;
        let retriever = HybridRetriever::new(Arc::clone(&store), &config.search);
        Ok(Self {
            provider,
            store,
            indexer,
            retriever,
            config,
        })
    }

    /// Segment, embed and persist one event's transcript.
    pub async fn index(&self, event: &EventContext, transcript: &str) -> IndexingResult {
        self.indexer.index(event, transcript).await
    }

    /// Index an unvalidated event record; a missing id is an error.
    pub async fn index_record(&self, record: EventRecord) -> Result<IndexingResult> {
        self.indexer.index_record(record).await
    }

    /// Index many records in order, continuing past failures.
    pub async fn index_many(&self, records: Vec<EventRecord>) -> Vec<IndexingResult> {
        self.indexer.index_many(records).await
    }

    /// Drop every chunk of an event.
    pub async fn remove(&self, event_id: Uuid) -> Result<usize> {
        self.indexer.remove(event_id).await
    }

    /// Run a request as given; vector and hybrid modes use `request.embedding`.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        self.retriever.execute(request).await
    }

    /// Search by text, embedding the query with the engine's provider when
    /// the mode needs it.
    ///
    /// If the query cannot be embedded, hybrid falls back to lexical-only
    /// results and vector mode returns nothing.
    pub async fn query(
        &self,
        text: &str,
        size: usize,
        event_ids: Option<Vec<Uuid>>,
        mode: SearchMode,
    ) -> Result<Vec<SearchHit>> {
        let mut request = SearchRequest::new(text).with_size(size).with_mode(mode);
        request.event_ids = event_ids;

        if mode != SearchMode::Lexical {
            match self.embed_query(text).await {
                Ok(embedding) => request.embedding = Some(embedding),
                Err(err) if mode == SearchMode::Vector => {
                    warn!(error = %err, "query embedding failed, vector search skipped");
                    return Ok(Vec::new());
                }
                Err(err) => {
                    warn!(error = %err, "query embedding failed, using lexical results only");
                }
            }
        }
        self.retriever.execute(&request).await
    }

    /// Embed query text with retry, bounded as a whole by the search timeout.
    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        let provider = &self.provider;
        let deadline = self.config.search.timeout;
        let attempt = self
            .config
            .indexing
            .retry
            .run("embed query", move || async move { provider.embed_query(text).await });
        tokio::time::timeout(deadline, attempt)
            .await
            .map_err(|_| Error::Timeout(deadline))?
    }

    /// Number of stored chunks.
    pub async fn len(&self) -> Result<usize> {
        self.store.len().await
    }

    /// Returns `true` if no chunks are stored.
    pub async fn is_empty(&self) -> Result<bool> {
        self.store.is_empty().await
    }

    #[must_use]
    pub fn provider(&self) -> &E {
        &self.provider
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
