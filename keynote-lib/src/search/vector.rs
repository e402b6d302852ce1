use std::sync::Arc;

use tracing::error;
use uuid::Uuid;

use crate::search::{SearchHit, SearchSource};
use crate::store::ChunkStore;
use crate::{Error, Result};

/// Nearest-neighbour search by cosine distance over chunk embeddings.
pub struct VectorSearcher<S: ChunkStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ChunkStore + ?Sized> Clone for VectorSearcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ChunkStore + ?Sized> VectorSearcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Dimension a query embedding must have.
    pub fn dimension(&self) -> usize {
        self.store.dimension()
    }

    /// Fail fast on a query of the wrong dimension.
    pub fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension() {
            return Err(Error::Configuration(format!(
                "query embedding has {} dimensions, expected {}",
                embedding.len(),
                self.dimension()
            )));
        }
        Ok(())
    }

    /// At most `size` hits, closest first, ties by ascending chunk index.
    ///
    /// A dimension mismatch is returned as an error; storage failures are
    /// logged and yield no hits.
    pub async fn search(
        &self,
        embedding: &[f32],
        size: usize,
        event_ids: Option<&[Uuid]>,
    ) -> Result<Vec<SearchHit>> {
        self.check_dimension(embedding)?;
        if size == 0 {
            return Ok(Vec::new());
        }
        match self.store.search_vector(embedding, size, event_ids).await {
            Ok(rows) => Ok(rows
                .into_iter()
                .enumerate()
                .map(|(rank, row)| SearchHit::from_scored(row, SearchSource::Vector, rank))
                .collect()),
            Err(err @ Error::Configuration(_)) => Err(err),
            Err(err) => {
                error!(error = %err, "vector search failed");
                Ok(Vec::new())
            }
        }
    }
}
