use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::store::text::TextQuery;
use crate::store::{ChunkStore, ScoredChunk, StoredChunk};
use crate::{Error, Result};

/// In-memory chunk store for development and testing.
///
/// Uses brute-force cosine similarity and in-process text ranking. Suitable
/// for small datasets (< 10k chunks). For production, use [`PgChunkStore`](crate::store::PgChunkStore).
pub struct MemoryStore {
    dimension: usize,
    events: RwLock<HashMap<Uuid, Vec<StoredChunk>>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store for `dimension`-sized embeddings.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            events: RwLock::new(HashMap::new()),
        }
    }

    /// Score every row of the selected events with `score`, keeping matches.
    fn rank_by<F>(&self, limit: usize, event_ids: Option<&[Uuid]>, score: F) -> Result<Vec<ScoredChunk>>
    where
        F: Fn(&StoredChunk) -> Option<f32>,
    {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let events = self.events.read().map_err(|_| poisoned())?;

        let mut results: Vec<ScoredChunk> = events
            .iter()
            .filter(|(id, _)| event_ids.map_or(true, |ids| ids.contains(*id)))
            .flat_map(|(_, rows)| rows.iter())
            .filter_map(|row| {
                score(row).map(|score| ScoredChunk {
                    chunk: row.chunk.clone(),
                    score,
                })
            })
            .collect();

        results.sort_by(compare_hits);
        results.truncate(limit);
        Ok(results)
    }
}

/// Best score first; ties by position in the event, then by identity.
fn compare_hits(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        .then_with(|| a.chunk.event_id.cmp(&b.chunk.event_id))
}

fn poisoned() -> Error {
    Error::Store("memory store lock poisoned".to_string())
}

#[async_trait]
impl ChunkStore for MemoryStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn replace_event_chunks(&self, event_id: Uuid, rows: &[StoredChunk]) -> Result<usize> {
        // validate everything before touching the map so a bad row changes nothing
        for row in rows {
            row.validate(event_id, self.dimension)?;
        }
        let mut events = self.events.write().map_err(|_| poisoned())?;
        if rows.is_empty() {
            events.remove(&event_id);
        } else {
            let mut rows = rows.to_vec();
            rows.sort_by_key(|row| row.chunk.chunk_index);
            events.insert(event_id, rows);
        }
        Ok(rows.len())
    }

    async fn delete_event_chunks(&self, event_id: Uuid) -> Result<usize> {
        let mut events = self.events.write().map_err(|_| poisoned())?;
        Ok(events.remove(&event_id).map_or(0, |rows| rows.len()))
    }

    async fn count_event_chunks(&self, event_id: Uuid) -> Result<usize> {
        let events = self.events.read().map_err(|_| poisoned())?;
        Ok(events.get(&event_id).map_or(0, Vec::len))
    }

    async fn search_text(
        &self,
        query: &str,
        limit: usize,
        event_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ScoredChunk>> {
        let query = TextQuery::parse(query);
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.rank_by(limit, event_ids, |row| query.rank(&row.chunk.search_text))
    }

    async fn search_vector(
        &self,
        embedding: &[f32],
        limit: usize,
        event_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ScoredChunk>> {
        if embedding.len() != self.dimension {
            return Err(Error::Configuration(format!(
                "query embedding has {} dimensions, store expects {}",
                embedding.len(),
                self.dimension
            )));
        }
        self.rank_by(limit, event_ids, |row| {
            Some(cosine_similarity(embedding, &row.embedding))
        })
    }

    async fn len(&self) -> Result<usize> {
        let events = self.events.read().map_err(|_| poisoned())?;
        Ok(events.values().map(Vec::len).sum())
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 means identical direction, i.e.
/// `1 - cosine distance`. Zero vectors have similarity 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
