use std::sync::Arc;

use tracing::error;
use uuid::Uuid;

use crate::search::{SearchHit, SearchSource};
use crate::store::ChunkStore;

/// Keyword search over chunk `search_text`.
///
/// Queries use web-search syntax (implicit AND, `"phrases"`, `-exclusions`,
/// `or`). Storage failures are logged and yield no hits so that a hybrid
/// search can still use the vector side.
pub struct LexicalSearcher<S: ChunkStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ChunkStore + ?Sized> Clone for LexicalSearcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ChunkStore + ?Sized> LexicalSearcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// At most `size` hits, best first, ties by ascending chunk index.
    pub async fn search(&self, query: &str, size: usize, event_ids: Option<&[Uuid]>) -> Vec<SearchHit> {
        if size == 0 || query.trim().is_empty() {
            return Vec::new();
        }
        match self.store.search_text(query, size, event_ids).await {
            Ok(rows) => rows
                .into_iter()
                .enumerate()
                .map(|(rank, row)| SearchHit::from_scored(row, SearchSource::Lexical, rank))
                .collect(),
            Err(err) => {
                error!(error = %err, query, "lexical search failed");
                Vec::new()
            }
        }
    }
}
