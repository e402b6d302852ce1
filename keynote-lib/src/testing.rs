//! Fixtures shared by unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::chunk::{Chunk, ChunkMetadata};
use crate::store::{ChunkStore, MemoryStore, ScoredChunk, StoredChunk};
use crate::{Error, Result};

pub fn row(event_id: Uuid, index: usize, text: &str, embedding: Vec<f32>) -> StoredChunk {
    StoredChunk {
        chunk: Chunk {
            id: Uuid::new_v4(),
            event_id,
            chunk_index: index,
            search_text: text.to_string(),
            raw_text: text.to_string(),
            metadata: ChunkMetadata {
                chunk_index: index,
                word_count: text.split_whitespace().count(),
                ..Default::default()
            },
        },
        embedding,
    }
}

/// A memory store pre-loaded with `rows`, grouped per event.
pub async fn indexed_store(dimension: usize, rows: Vec<StoredChunk>) -> Arc<MemoryStore> {
    let mut by_event: HashMap<Uuid, Vec<StoredChunk>> = HashMap::new();
    for row in rows {
        by_event.entry(row.chunk.event_id).or_default().push(row);
    }
    let store = MemoryStore::new(dimension);
    for (event_id, rows) in by_event {
        store.replace_event_chunks(event_id, &rows).await.unwrap();
    }
    Arc::new(store)
}

/// Store whose every call fails.
pub struct BrokenStore;

fn down<T>() -> Result<T> {
    Err(Error::Store("connection refused".into()))
}

#[async_trait]
impl ChunkStore for BrokenStore {
    fn dimension(&self) -> usize {
        4
    }

    async fn replace_event_chunks(&self, _: Uuid, _: &[StoredChunk]) -> Result<usize> {
        down()
    }

    async fn delete_event_chunks(&self, _: Uuid) -> Result<usize> {
        down()
    }

    async fn count_event_chunks(&self, _: Uuid) -> Result<usize> {
        down()
    }

    async fn search_text(&self, _: &str, _: usize, _: Option<&[Uuid]>) -> Result<Vec<ScoredChunk>> {
        down()
    }

    async fn search_vector(&self, _: &[f32], _: usize, _: Option<&[Uuid]>) -> Result<Vec<ScoredChunk>> {
        down()
    }

    async fn len(&self) -> Result<usize> {
        down()
    }
}
