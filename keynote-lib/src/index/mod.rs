//! Event indexing pipeline
//!
//! ```text
//! EventContext + transcript -> TextSegmenter -> EmbeddingProvider (batched, retried)
//!                                                      |
//!                              ChunkStore::replace_event_chunks (one transaction)
//! ```
//!
//! Failures never leave partial rows: storage is only touched once every
//! chunk has a valid embedding, and the replace is all-or-nothing.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::chunk::{Chunk, TextSegmenter};
use crate::config::IndexingConfig;
use crate::embed::{Embedding, EmbeddingProvider};
use crate::event::{EventContext, EventRecord};
use crate::retry::RetryPolicy;
use crate::store::{ChunkStore, StoredChunk};
use crate::{Error, Result};

/// Outcome of indexing one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexingResult {
    pub chunks_created: usize,
    pub chunks_indexed: usize,
    pub embeddings_generated: usize,
    pub errors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl IndexingResult {
    /// A run that failed before anything was stored.
    fn failed(err: &Error) -> Self {
        Self {
            errors: 1,
            failure: Some(err.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors == 0
    }
}

/// Segments, embeds and persists event transcripts.
pub struct IndexingOrchestrator<E: EmbeddingProvider + ?Sized, S: ChunkStore + ?Sized> {
    provider: Arc<E>,
    store: Arc<S>,
    segmenter: TextSegmenter,
    retry: RetryPolicy,
}

impl<E: EmbeddingProvider + ?Sized, S: ChunkStore + ?Sized> IndexingOrchestrator<E, S> {
    pub fn new(provider: Arc<E>, store: Arc<S>, config: &IndexingConfig) -> Result<Self> {
        let segmenter = TextSegmenter::from_config(&config.chunking)?;
        if provider.max_batch_size() == 0 {
            return Err(Error::Configuration(format!(
                "embedding provider {} reports a batch size of 0",
                provider.model_name()
            )));
        }
        Ok(Self {
            provider,
            store,
            segmenter,
            retry: config.retry.clone(),
        })
    }

    pub fn segmenter(&self) -> &TextSegmenter {
        &self.segmenter
    }

    /// Replace the stored chunks of `event` with a fresh segmentation of
    /// `transcript`.
    ///
    /// Failures are reported in the result rather than returned: a count
    /// mismatch keeps `chunks_created` and `embeddings_generated` for
    /// diagnosis, any other failure zeroes the counts. In both cases
    /// `errors == 1` and the event's previous chunks are untouched.
    pub async fn index(&self, event: &EventContext, transcript: &str) -> IndexingResult {
        let chunks = self.segmenter.segment(event, transcript);
        if chunks.is_empty() {
            return IndexingResult::default();
        }
        let created = chunks.len();

        let embeddings = match self.embed_all(&chunks).await {
            Ok(embeddings) => embeddings,
            Err(err) => {
                error!(event_id = %event.id, error = %err, "embedding failed, nothing stored");
                return IndexingResult::failed(&err);
            }
        };
        let generated = embeddings.len();

        if let Err(err) = self.check_embeddings(created, &embeddings) {
            error!(event_id = %event.id, error = %err, "inconsistent embeddings, nothing stored");
            return IndexingResult {
                chunks_created: created,
                embeddings_generated: generated,
                ..IndexingResult::failed(&err)
            };
        }

        let rows: Vec<StoredChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| StoredChunk { chunk, embedding })
            .collect();

        match self.store.replace_event_chunks(event.id, &rows).await {
            Ok(indexed) => {
                info!(
                    event_id = %event.id,
                    chunks = indexed,
                    model = self.provider.model_name(),
                    "indexed event"
                );
                IndexingResult {
                    chunks_created: created,
                    chunks_indexed: indexed,
                    embeddings_generated: generated,
                    errors: 0,
                    failure: None,
                }
            }
            Err(err) => {
                error!(event_id = %event.id, error = %err, "storing chunks failed, rolled back");
                IndexingResult::failed(&err)
            }
        }
    }

    /// Validate a raw record, then index its transcription.
    ///
    /// A record without a usable event id is rejected before any work.
    pub async fn index_record(&self, record: EventRecord) -> Result<IndexingResult> {
        let event = EventContext::try_from(&record)?;
        let transcript = record.transcription.as_deref().unwrap_or_default();
        Ok(self.index(&event, transcript).await)
    }

    /// Index records one after another; a failing record does not stop the
    /// rest. Results are in input order.
    pub async fn index_many(&self, records: Vec<EventRecord>) -> Vec<IndexingResult> {
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            let result = match self.index_record(record).await {
                Ok(result) => result,
                Err(err) => {
                    error!(error = %err, "skipping event record");
                    IndexingResult::failed(&err)
                }
            };
            results.push(result);
        }
        results
    }

    /// Delete every chunk of an event.
    pub async fn remove(&self, event_id: Uuid) -> Result<usize> {
        let removed = self.store.delete_event_chunks(event_id).await?;
        info!(%event_id, chunks = removed, "removed event chunks");
        Ok(removed)
    }

    /// Embed every chunk's search text in provider-sized batches, in order.
    async fn embed_all(&self, chunks: &[Chunk]) -> Result<Vec<Embedding>> {
        let provider = &self.provider;
        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(provider.max_batch_size().max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.search_text.clone()).collect();
            let texts = &texts;
            let vectors = self
                .retry
                .run("embed passages", move || async move {
                    provider.embed_passages(texts).await
                })
                .await?;
            embeddings.extend(vectors);
        }
        Ok(embeddings)
    }

    fn check_embeddings(&self, expected: usize, embeddings: &[Embedding]) -> Result<()> {
        if embeddings.len() != expected {
            return Err(Error::Consistency(format!(
                "received {} embeddings for {expected} chunks",
                embeddings.len()
            )));
        }
        let dimension = self.store.dimension();
        if let Some((i, bad)) = embeddings.iter().enumerate().find(|(_, e)| e.len() != dimension) {
            return Err(Error::Consistency(format!(
                "embedding {i} has {} dimensions, expected {dimension}",
                bad.len()
            )));
        }
        Ok(())
    }
}
