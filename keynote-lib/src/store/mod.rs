//! Chunk storage backends
//!
//! [`MemoryStore`] for development and tests, [`PgChunkStore`] (Postgres +
//! pgvector) for deployments.
//!
//! # Storage Model
//!
//! Each stored row consists of:
//! - Chunk: search/raw text, position and metadata
//! - Embedding: the vector representation of `search_text`
//!
//! Rows belong to exactly one event. Writes are scoped to an event and are
//! all-or-nothing: [`ChunkStore::replace_event_chunks`] deletes the event's
//! previous rows and inserts the new set in one transaction.
//!
//! # Usage
//!
//! ```ignore
//! use keynote_lib::store::{ChunkStore, MemoryStore};
//!
//! let store = MemoryStore::new(1024);
//!
//! // Replace an event's chunks with a freshly embedded set
//! store.replace_event_chunks(event_id, &rows).await?;
//!
//! // Rank by text relevance or by vector similarity
//! let lexical = store.search_text("solar energy", 10, None).await?;
//! let dense = store.search_vector(&query_embedding, 10, Some(&[event_id])).await?;
//! ```

use async_trait::async_trait;
use uuid::Uuid;

use crate::chunk::Chunk;
use crate::embed::Embedding;
use crate::{Error, Result};

/// A chunk paired with its embedding, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub chunk: Chunk,
    pub embedding: Embedding,
}

impl StoredChunk {
    /// Write-time checks: the row belongs to `event_id`, its metadata agrees
    /// with the chunk, and the vector has the store's dimension.
    pub fn validate(&self, event_id: Uuid, dimension: usize) -> Result<()> {
        let chunk = &self.chunk;
        if chunk.event_id != event_id {
            return Err(Error::Validation(format!(
                "chunk {} belongs to event {}, not {}",
                chunk.id, chunk.event_id, event_id
            )));
        }
        if chunk.metadata.chunk_index != chunk.chunk_index {
            return Err(Error::Validation(format!(
                "chunk {} metadata index {} disagrees with position {}",
                chunk.id, chunk.metadata.chunk_index, chunk.chunk_index
            )));
        }
        if chunk.metadata.word_count != chunk.word_count() {
            return Err(Error::Validation(format!(
                "chunk {} metadata word count {} disagrees with text ({} words)",
                chunk.id,
                chunk.metadata.word_count,
                chunk.word_count()
            )));
        }
        if self.embedding.len() != dimension {
            return Err(Error::Consistency(format!(
                "chunk {} has a {}-dimensional embedding, store expects {}",
                chunk.id,
                self.embedding.len(),
                dimension
            )));
        }
        Ok(())
    }
}

/// A stored chunk with a relevance score (higher is better).
///
/// Lexical scores are cover-density ranks; vector scores are `1 - cosine distance`.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Trait for chunk storage backends
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Dimension every stored embedding must have
    fn dimension(&self) -> usize;

    /// Atomically delete all chunks of `event_id` and insert `rows`.
    ///
    /// Either every row is written or the store is left untouched.
    /// Returns the number of rows inserted.
    async fn replace_event_chunks(&self, event_id: Uuid, rows: &[StoredChunk]) -> Result<usize>;

    /// Delete every chunk of an event. Returns the number of rows removed.
    async fn delete_event_chunks(&self, event_id: Uuid) -> Result<usize>;

    /// Number of chunks stored for an event
    async fn count_event_chunks(&self, event_id: Uuid) -> Result<usize>;

    /// Rank chunks by text relevance of `search_text` against a web-search style query
    ///
    /// # Returns
    /// At most `limit` results, best first, ties by ascending `chunk_index`
    async fn search_text(
        &self,
        query: &str,
        limit: usize,
        event_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Rank chunks by cosine similarity to `embedding`
    ///
    /// # Returns
    /// At most `limit` results, closest first, ties by ascending `chunk_index`
    async fn search_vector(
        &self,
        embedding: &[f32],
        limit: usize,
        event_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Total number of stored chunks
    async fn len(&self) -> Result<usize>;

    /// Check if store is empty
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

mod memory;
mod postgres;
pub mod text;

pub use memory::*;
pub use postgres::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::row;
    use crate::chunk::ChunkMetadata;


    #[test]
    fn test_valid_row_passes() {
        let event = Uuid::new_v4();
        row(event, 0, "hello there", vec![0.5; 4]).validate(event, 4).unwrap();
    }

    #[test]
    fn test_foreign_event_rejected() {
        let event = Uuid::new_v4();
        let err = row(event, 0, "hello", vec![0.5; 4]).validate(Uuid::new_v4(), 4).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_inconsistent_metadata_rejected() {
        let event = Uuid::new_v4();
        let mut bad_index = row(event, 1, "hello", vec![0.5; 4]);
        bad_index.chunk.metadata.chunk_index = 2;
        assert!(bad_index.validate(event, 4).is_err());

        let mut bad_count = row(event, 0, "hello world", vec![0.5; 4]);
        bad_count.chunk.metadata.word_count = 5;
        assert!(bad_count.validate(event, 4).is_err());
    }

    #[test]
    fn test_wrong_dimension_rejected() {
        let event = Uuid::new_v4();
        let err = row(event, 0, "hello", vec![0.5; 3]).validate(event, 4).unwrap_err();
        assert!(matches!(err, Error::Consistency(_)));
    }

    #[test]
    fn test_metadata_rejects_unknown_keys() {
        let json = r#"{"chunk_index":0,"word_count":3,"event_name":"x","guest":"","organizer":"",
            "venue":"","overlap_prev":0,"overlap_next":0,"sentiment":"positive"}"#;
        assert!(serde_json::from_str::<ChunkMetadata>(json).is_err());
    }
}
