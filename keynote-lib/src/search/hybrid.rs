use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SearchConfig;
use crate::search::{FusionRanker, LexicalSearcher, SearchHit, SearchMode, SearchRequest, VectorSearcher};
use crate::store::ChunkStore;
use crate::{Error, Result};

/// Runs lexical and vector search side by side and fuses them with RRF.
///
/// Each side fetches `size * candidate_multiplier` candidates and is bounded
/// by the configured timeout; a side that fails or times out contributes
/// nothing, so the other side's results still come through.
pub struct HybridRetriever<S: ChunkStore + ?Sized> {
    lexical: LexicalSearcher<S>,
    vector: VectorSearcher<S>,
    fusion: FusionRanker,
    candidate_multiplier: usize,
    timeout: Duration,
}

impl<S: ChunkStore + ?Sized> HybridRetriever<S> {
    pub fn new(store: Arc<S>, config: &SearchConfig) -> Self {
        Self {
            lexical: LexicalSearcher::new(Arc::clone(&store)),
            vector: VectorSearcher::new(store),
            fusion: FusionRanker::new(config.rrf_k),
            candidate_multiplier: config.candidate_multiplier.max(1),
            timeout: config.timeout,
        }
    }

    /// Dispatch on `request.mode`.
    ///
    /// Vector mode needs `request.embedding`; hybrid without one fuses the
    /// lexical ranking alone.
    pub async fn execute(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let filter = request.filter();
        debug!(mode = %request.mode, size = request.size, "search");
        match request.mode {
            SearchMode::Lexical => Ok(self.lexical_within(&request.query, request.size, filter).await),
            SearchMode::Vector => {
                let embedding = request.embedding.as_deref().ok_or_else(|| {
                    Error::Validation("vector search requires a query embedding".to_string())
                })?;
                self.vector.check_dimension(embedding)?;
                self.vector_within(embedding, request.size, filter).await
            }
            SearchMode::Hybrid => {
                self.search(&request.query, request.embedding.as_deref(), request.size, filter)
                    .await
            }
        }
    }

    /// Hybrid search: at most `size` fused hits, no chunk twice.
    pub async fn search(
        &self,
        query: &str,
        embedding: Option<&[f32]>,
        size: usize,
        event_ids: Option<&[Uuid]>,
    ) -> Result<Vec<SearchHit>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let candidates = size.saturating_mul(self.candidate_multiplier);

        let Some(embedding) = embedding else {
            let lexical = self.lexical_within(query, candidates, event_ids).await;
            return Ok(self.fusion.fuse(&lexical, &[], size));
        };
        self.vector.check_dimension(embedding)?;

        let (lexical, vector) = tokio::join!(
            self.lexical_within(query, candidates, event_ids),
            self.vector_within(embedding, candidates, event_ids),
        );
        let vector = vector?;
        debug!(lexical = lexical.len(), vector = vector.len(), "fusing candidates");
        Ok(self.fusion.fuse(&lexical, &vector, size))
    }

    async fn lexical_within(&self, query: &str, size: usize, event_ids: Option<&[Uuid]>) -> Vec<SearchHit> {
        match timeout(self.timeout, self.lexical.search(query, size, event_ids)).await {
            Ok(hits) => hits,
            Err(_) => {
                warn!(error = %Error::Timeout(self.timeout), "lexical search abandoned");
                Vec::new()
            }
        }
    }

    async fn vector_within(
        &self,
        embedding: &[f32],
        size: usize,
        event_ids: Option<&[Uuid]>,
    ) -> Result<Vec<SearchHit>> {
        match timeout(self.timeout, self.vector.search(embedding, size, event_ids)).await {
            Ok(hits) => hits,
            Err(_) => {
                warn!(error = %Error::Timeout(self.timeout), "vector search abandoned");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;

    use super::*;
    use crate::search::SearchSource;
    use crate::store::{MemoryStore, ScoredChunk, StoredChunk};
    use crate::testing::{indexed_store, row};

    fn config() -> SearchConfig {
        SearchConfig::default()
    }

    async fn sample_store(a: Uuid, b: Uuid) -> Arc<MemoryStore> {
        indexed_store(
            3,
            vec![
                row(a, 0, "solar energy for rural schools", vec![1.0, 0.0, 0.0]),
                row(a, 1, "wind farms and solar energy storage", vec![0.9, 0.1, 0.0]),
                row(a, 2, "questions from the audience", vec![0.0, 1.0, 0.0]),
                row(b, 0, "solar energy subsidies", vec![0.8, 0.0, 0.2]),
                row(b, 1, "vote of thanks", vec![0.0, 0.0, 1.0]),
            ],
        )
        .await
    }

    /// Sleeps before answering each kind of query.
    struct SlowStore {
        inner: Arc<MemoryStore>,
        text_delay: Duration,
        vector_delay: Duration,
    }

    #[async_trait]
    impl ChunkStore for SlowStore {
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
        async fn replace_event_chunks(&self, event_id: Uuid, rows: &[StoredChunk]) -> Result<usize> {
            self.inner.replace_event_chunks(event_id, rows).await
        }
        async fn delete_event_chunks(&self, event_id: Uuid) -> Result<usize> {
            self.inner.delete_event_chunks(event_id).await
        }
        async fn count_event_chunks(&self, event_id: Uuid) -> Result<usize> {
            self.inner.count_event_chunks(event_id).await
        }
        async fn search_text(&self, query: &str, limit: usize, ids: Option<&[Uuid]>) -> Result<Vec<ScoredChunk>> {
            tokio::time::sleep(self.text_delay).await;
            self.inner.search_text(query, limit, ids).await
        }
        async fn search_vector(&self, e: &[f32], limit: usize, ids: Option<&[Uuid]>) -> Result<Vec<ScoredChunk>> {
            tokio::time::sleep(self.vector_delay).await;
            self.inner.search_vector(e, limit, ids).await
        }
        async fn len(&self) -> Result<usize> {
            self.inner.len().await
        }
    }

    #[tokio::test]
    async fn test_hybrid_has_no_duplicates() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let retriever = HybridRetriever::new(sample_store(a, b).await, &config());

        let hits = retriever
            .search("solar energy", Some(&[1.0, 0.0, 0.0]), 10, None)
            .await
            .unwrap();

        let unique: HashSet<Uuid> = hits.iter().map(|h| h.chunk_id).collect();
        assert_eq!(unique.len(), hits.len());
        assert_eq!(hits.len(), 5);
        assert!(hits.iter().all(|h| h.source == SearchSource::Hybrid));
        // found by both modalities, so it outranks vector-only hits
        assert!(hits[0].lexical_rank.is_some() && hits[0].vector_rank.is_some());
    }

    #[tokio::test]
    async fn test_hybrid_respects_filter() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let retriever = HybridRetriever::new(sample_store(a, b).await, &config());

        let hits = retriever
            .search("solar energy", Some(&[1.0, 0.0, 0.0]), 10, Some(&[b]))
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.event_id == b));
    }

    #[tokio::test]
    async fn test_hybrid_without_embedding_is_lexical_only() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let retriever = HybridRetriever::new(sample_store(a, b).await, &config());

        let hits = retriever.search("solar energy", None, 10, None).await.unwrap();

        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.vector_rank.is_none()));
    }

    #[tokio::test]
    async fn test_hybrid_size_caps_results() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let retriever = HybridRetriever::new(sample_store(a, b).await, &config());
        let hits = retriever
            .search("solar energy", Some(&[1.0, 0.0, 0.0]), 2, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(retriever.search("solar", None, 0, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_not_swallowed() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let retriever = HybridRetriever::new(sample_store(a, b).await, &config());
        let err = retriever
            .search("solar", Some(&[1.0, 0.0]), 5, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_execute_dispatches_on_mode() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let retriever = HybridRetriever::new(sample_store(a, b).await, &config());

        let lexical = retriever
            .execute(&SearchRequest::new("solar energy").with_mode(SearchMode::Lexical))
            .await
            .unwrap();
        assert!(lexical.iter().all(|h| h.source == SearchSource::Lexical));
        assert_eq!(lexical.len(), 3);

        let vector = retriever
            .execute(
                &SearchRequest::new("")
                    .with_embedding(vec![0.0, 1.0, 0.0])
                    .with_size(1)
                    .with_mode(SearchMode::Vector),
            )
            .await
            .unwrap();
        assert_eq!(vector[0].text, "questions from the audience");

        let missing = retriever
            .execute(&SearchRequest::new("solar").with_mode(SearchMode::Vector))
            .await
            .unwrap_err();
        assert!(matches!(missing, Error::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_side_counts_as_empty() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let store = Arc::new(SlowStore {
            inner: sample_store(a, b).await,
            text_delay: Duration::ZERO,
            vector_delay: Duration::from_secs(60),
        });
        let config = SearchConfig {
            timeout: Duration::from_millis(100),
            ..SearchConfig::default()
        };
        let retriever = HybridRetriever::new(store, &config);

        let hits = retriever
            .search("solar energy", Some(&[1.0, 0.0, 0.0]), 10, None)
            .await
            .unwrap();

        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.vector_rank.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sides_run_concurrently() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let store = Arc::new(SlowStore {
            inner: sample_store(a, b).await,
            text_delay: Duration::from_millis(80),
            vector_delay: Duration::from_millis(80),
        });
        let config = SearchConfig {
            timeout: Duration::from_millis(100),
            ..SearchConfig::default()
        };
        let retriever = HybridRetriever::new(store, &config);

        let started = tokio::time::Instant::now();
        let hits = retriever
            .search("solar energy", Some(&[1.0, 0.0, 0.0]), 10, None)
            .await
            .unwrap();

        // awaited one after the other the two sides would take 160ms
        assert!(started.elapsed() < Duration::from_millis(160));
        assert!(hits.iter().any(|h| h.lexical_rank.is_some()));
        assert!(hits.iter().any(|h| h.vector_rank.is_some()));
        assert_eq!(hits.len(), 5);
    }
}
