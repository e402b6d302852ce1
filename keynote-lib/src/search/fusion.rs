use std::cmp::Ordering;
use std::collections::HashMap;

use uuid::Uuid;

use crate::search::{SearchHit, SearchSource};

/// Reciprocal Rank Fusion over a lexical and a vector ranking.
///
/// An item at 0-based rank `r` in a list contributes `1 / (k + r + 1)`;
/// contributions for the same chunk are summed. Only rank positions matter,
/// so the fused score is a relative ranking signal, not a similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionRanker {
    k: f64,
}

impl Default for FusionRanker {
    fn default() -> Self {
        Self { k: 60.0 }
    }
}

struct Fused {
    hit: SearchHit,
    score: f64,
    lexical_rank: Option<usize>,
    vector_rank: Option<usize>,
}

impl Fused {
    fn best_rank(&self) -> usize {
        self.lexical_rank
            .into_iter()
            .chain(self.vector_rank)
            .min()
            .unwrap_or(usize::MAX)
    }
}

impl FusionRanker {
    #[must_use]
    pub fn new(k: f64) -> Self {
        Self { k }
    }

    #[must_use]
    pub fn k(&self) -> f64 {
        self.k
    }

    fn contribution(&self, rank: usize) -> f64 {
        1.0 / (self.k + rank as f64 + 1.0)
    }

    /// Merge both lists into at most `size` hybrid hits, best first.
    ///
    /// Equal scores are ordered by the best rank reached in either list,
    /// then by vector rank, then by lexical rank.
    #[must_use]
    pub fn fuse(&self, lexical: &[SearchHit], vector: &[SearchHit], size: usize) -> Vec<SearchHit> {
        let mut fused: HashMap<Uuid, Fused> = HashMap::new();

        for (rank, hit) in lexical.iter().enumerate() {
            let entry = fused.entry(hit.chunk_id).or_insert_with(|| Fused {
                hit: hit.clone(),
                score: 0.0,
                lexical_rank: None,
                vector_rank: None,
            });
            if entry.lexical_rank.is_none() {
                entry.lexical_rank = Some(rank);
                entry.score += self.contribution(rank);
            }
        }

        for (rank, hit) in vector.iter().enumerate() {
            let entry = fused.entry(hit.chunk_id).or_insert_with(|| Fused {
                hit: hit.clone(),
                score: 0.0,
                lexical_rank: None,
                vector_rank: None,
            });
            if entry.vector_rank.is_none() {
                entry.vector_rank = Some(rank);
                entry.score += self.contribution(rank);
            }
        }

        let mut ranked: Vec<Fused> = fused.into_values().collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.best_rank().cmp(&b.best_rank()))
                .then_with(|| rank_key(a.vector_rank).cmp(&rank_key(b.vector_rank)))
                .then_with(|| rank_key(a.lexical_rank).cmp(&rank_key(b.lexical_rank)))
        });

        ranked
            .into_iter()
            .take(size)
            .map(|f| SearchHit {
                score: f.score,
                source: SearchSource::Hybrid,
                lexical_rank: f.lexical_rank,
                vector_rank: f.vector_rank,
                ..f.hit
            })
            .collect()
    }
}

fn rank_key(rank: Option<usize>) -> usize {
    rank.unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkMetadata;

    fn hit(id: Uuid, source: SearchSource) -> SearchHit {
        SearchHit {
            chunk_id: id,
            event_id: Uuid::nil(),
            chunk_index: 0,
            text: String::new(),
            score: 0.5,
            source,
            metadata: ChunkMetadata::default(),
            lexical_rank: None,
            vector_rank: None,
        }
    }

    fn ids(hits: &[SearchHit]) -> Vec<Uuid> {
        hits.iter().map(|h| h.chunk_id).collect()
    }

    #[test]
    fn test_rrf_determinism() {
        let [a, b, c, d] = [1u128, 2, 3, 4].map(Uuid::from_u128);
        let lexical: Vec<_> = [a, b, c].map(|id| hit(id, SearchSource::Lexical)).into();
        let vector: Vec<_> = [b, a, d].map(|id| hit(id, SearchSource::Vector)).into();

        let fused = FusionRanker::new(60.0).fuse(&lexical, &vector, 10);

        assert_eq!(fused.len(), 4);
        let top = [fused[0].chunk_id, fused[1].chunk_id];
        assert!(top.contains(&a) && top.contains(&b));
        assert_eq!(fused[2].chunk_id, d);
        assert_eq!(fused[3].chunk_id, c);

        let both = 1.0 / 61.0 + 1.0 / 62.0;
        assert!((fused[0].score - both).abs() < 1e-12);
        assert!((fused[1].score - both).abs() < 1e-12);
        assert!((fused[3].score - 1.0 / 63.0).abs() < 1e-12);

        // same input, same order
        let again = FusionRanker::new(60.0).fuse(&lexical, &vector, 10);
        assert_eq!(ids(&fused), ids(&again));
    }

    #[test]
    fn test_fused_hits_keep_modality_ranks() {
        let [a, b] = [1u128, 2].map(Uuid::from_u128);
        let lexical = vec![hit(a, SearchSource::Lexical)];
        let vector = vec![hit(b, SearchSource::Vector), hit(a, SearchSource::Vector)];

        let fused = FusionRanker::default().fuse(&lexical, &vector, 10);

        assert_eq!(fused[0].chunk_id, a);
        assert_eq!(fused[0].lexical_rank, Some(0));
        assert_eq!(fused[0].vector_rank, Some(1));
        assert_eq!(fused[1].lexical_rank, None);
        assert!(fused.iter().all(|h| h.source == SearchSource::Hybrid));
    }

    #[test]
    fn test_size_truncates() {
        let hits: Vec<_> = (0..5u128)
            .map(|i| hit(Uuid::from_u128(i), SearchSource::Lexical))
            .collect();
        assert_eq!(FusionRanker::default().fuse(&hits, &[], 3).len(), 3);
        assert!(FusionRanker::default().fuse(&hits, &[], 0).is_empty());
    }

    #[test]
    fn test_empty_inputs() {
        assert!(FusionRanker::default().fuse(&[], &[], 10).is_empty());
    }

    #[test]
    fn test_single_list_preserves_order() {
        let hits: Vec<_> = (0..4u128)
            .map(|i| hit(Uuid::from_u128(i), SearchSource::Lexical))
            .collect();
        let fused = FusionRanker::default().fuse(&hits, &[], 10);
        assert_eq!(ids(&fused), ids(&hits));
    }

    #[test]
    fn test_duplicate_ids_counted_once_per_list() {
        let a = Uuid::from_u128(1);
        let lexical = vec![hit(a, SearchSource::Lexical), hit(a, SearchSource::Lexical)];
        let fused = FusionRanker::default().fuse(&lexical, &[], 10);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-12);
    }
}
