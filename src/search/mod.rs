//! Hybrid search with dense and sparse retrieval.
//!
//! Issues both index legs concurrently, fuses them with weighted
//! Reciprocal Rank Fusion and applies the multiplicative boost table.
//! A failure in one leg degrades to the other; only the loss of every
//! attempted leg is an error.

mod boost;
mod rrf;

pub use boost::{BoostContext, apply_boosts};
pub use rrf::{FusionConfig, fuse};

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::core::{DenseVector, Hit, SparseVector};
use crate::error::IndexError;
use crate::index::{IndexHit, MetadataFilter, QueryVector, VectorIndex};

/// Hybrid searcher over one index collection.
///
/// Pure function of (query vectors, boost context, filter, index state);
/// holds no per-query state and no caches.
pub struct HybridSearcher {
    index: Arc<dyn VectorIndex>,
    config: Arc<RetrievalConfig>,
}

impl HybridSearcher {
    /// Creates a searcher over the shared index client.
    #[must_use]
    pub fn new(index: Arc<dyn VectorIndex>, config: Arc<RetrievalConfig>) -> Self {
        Self { index, config }
    }

    /// Runs hybrid retrieval and returns up to `k` hits ranked by
    /// `boosted_score`.
    ///
    /// Each leg requests `2k` candidates for better fusion recall. The
    /// sparse leg runs only when enabled and the sparse vector is
    /// non-empty. `k == 0` short-circuits without touching the index.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] only when every attempted leg failed; an
    /// empty result set is `Ok(vec![])`.
    pub async fn search(
        &self,
        dense: &DenseVector,
        sparse: &SparseVector,
        k: usize,
        ctx: &BoostContext,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Hit>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let fetch_limit = leg_limit(k);
        let sparse_enabled = self.config.use_sparse && !sparse.is_empty();
        debug!(
            k,
            fetch_limit,
            sparse_enabled,
            filtered = filter.is_some(),
            "hybrid search"
        );

        let dense_query = QueryVector::Dense(dense.clone());
        let dense_leg = self.leg(&dense_query, fetch_limit, filter);

        let (dense_result, sparse_result) = if sparse_enabled {
            let sparse_query = QueryVector::Sparse(sparse.clone());
            let sparse_leg = self.leg(&sparse_query, fetch_limit, filter);
            futures_util::future::join(dense_leg, sparse_leg).await
        } else {
            (dense_leg.await, Ok(Vec::new()))
        };

        let dense_failed = dense_result.is_err();
        let sparse_failed = sparse_result.is_err();
        let dense_hits = dense_result.unwrap_or_else(|e| {
            warn!(error = %e, "dense leg failed");
            Vec::new()
        });
        let sparse_hits = sparse_result.unwrap_or_else(|e| {
            warn!(error = %e, "sparse leg failed");
            Vec::new()
        });

        if dense_failed && (!sparse_enabled || sparse_failed) {
            return Err(IndexError::SearchFailed(
                "all search legs failed".to_string(),
            ));
        }

        let fusion = FusionConfig {
            k: self.config.rrf_k,
            dense_weight: self.config.hybrid_dense_weight,
            sparse_weight: self.config.hybrid_sparse_weight,
        };
        let mut fused = fuse(&dense_hits, &sparse_hits, &fusion);
        debug!(fused = fused.len(), "rrf fusion complete");

        for hit in &mut fused {
            apply_boosts(
                hit,
                ctx,
                &self.config.boosts,
                &self.config.reliable_sources,
            );
        }

        // Stable sort keeps fused order on boosted-score ties.
        fused.sort_by(|a, b| {
            b.boosted_score
                .partial_cmp(&a.boosted_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        fused.truncate(k);
        Ok(fused)
    }

    async fn leg(
        &self,
        vector: &QueryVector,
        limit: u32,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let timeout = self.config.timeouts.search;
        match tokio::time::timeout(
            timeout,
            self.index.search(
                &self.config.collection,
                vector,
                limit,
                filter,
                self.config.hnsw_ef_search,
            ),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(IndexError::Timeout {
                operation: "search",
                seconds: timeout.as_secs(),
            }),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn leg_limit(k: usize) -> u32 {
    (k.saturating_mul(2)).min(u32::MAX as usize) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::index::ScrollPage;

    /// Scripted index: canned per-leg answers plus a call log.
    struct ScriptedIndex {
        dense: Result<Vec<IndexHit>, ()>,
        sparse: Result<Vec<IndexHit>, ()>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedIndex {
        fn new(dense: Result<Vec<IndexHit>, ()>, sparse: Result<Vec<IndexHit>, ()>) -> Self {
            Self {
                dense,
                sparse,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for ScriptedIndex {
        async fn search(
            &self,
            _collection: &str,
            vector: &QueryVector,
            _limit: u32,
            _filter: Option<&MetadataFilter>,
            _accuracy: u32,
        ) -> Result<Vec<IndexHit>, IndexError> {
            self.calls.lock().push(vector.vector_name().to_string());
            let result = match vector {
                QueryVector::Dense(_) => &self.dense,
                QueryVector::Sparse(_) => &self.sparse,
            };
            result
                .clone()
                .map_err(|()| IndexError::SearchFailed("scripted failure".to_string()))
        }

        async fn scroll(
            &self,
            _collection: &str,
            _filter: &MetadataFilter,
            _limit: u32,
            _offset: Option<String>,
        ) -> Result<ScrollPage, IndexError> {
            Ok(ScrollPage::default())
        }
    }

    fn index_hit(id: &str, text: &str) -> IndexHit {
        let mut payload = serde_json::Map::new();
        payload.insert("text".to_string(), json!(text));
        IndexHit {
            id: id.to_string(),
            score: 0.5,
            payload,
        }
    }

    fn searcher(index: ScriptedIndex) -> HybridSearcher {
        HybridSearcher::new(Arc::new(index), Arc::new(RetrievalConfig::default()))
    }

    fn sparse_vector() -> SparseVector {
        SparseVector {
            indices: vec![1, 2],
            values: vec![0.5, 0.3],
        }
    }

    #[tokio::test]
    async fn test_k_zero_makes_no_index_calls() {
        let index = ScriptedIndex::new(Ok(vec![index_hit("a", "t")]), Ok(vec![]));
        let calls = Arc::new(index);
        let searcher = HybridSearcher::new(
            Arc::clone(&calls) as Arc<dyn VectorIndex>,
            Arc::new(RetrievalConfig::default()),
        );

        let hits = searcher
            .search(&vec![0.1], &sparse_vector(), 0, &BoostContext::default(), None)
            .await
            .unwrap();
        assert!(hits.is_empty());
        assert!(calls.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_both_legs_queried() {
        let index = ScriptedIndex::new(
            Ok(vec![index_hit("a", "alpha")]),
            Ok(vec![index_hit("b", "beta")]),
        );
        let shared = Arc::new(index);
        let searcher = HybridSearcher::new(
            Arc::clone(&shared) as Arc<dyn VectorIndex>,
            Arc::new(RetrievalConfig::default()),
        );

        let hits = searcher
            .search(&vec![0.1], &sparse_vector(), 5, &BoostContext::default(), None)
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        let calls = shared.calls.lock();
        assert!(calls.contains(&"dense".to_string()));
        assert!(calls.contains(&"sparse".to_string()));
    }

    #[tokio::test]
    async fn test_empty_sparse_vector_skips_sparse_leg() {
        let index = ScriptedIndex::new(Ok(vec![index_hit("a", "alpha")]), Ok(vec![]));
        let shared = Arc::new(index);
        let searcher = HybridSearcher::new(
            Arc::clone(&shared) as Arc<dyn VectorIndex>,
            Arc::new(RetrievalConfig::default()),
        );

        let hits = searcher
            .search(
                &vec![0.1],
                &SparseVector::empty(),
                5,
                &BoostContext::default(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(*shared.calls.lock(), vec!["dense".to_string()]);
    }

    #[tokio::test]
    async fn test_use_sparse_off_skips_sparse_leg() {
        let index = ScriptedIndex::new(Ok(vec![index_hit("a", "alpha")]), Ok(vec![]));
        let shared = Arc::new(index);
        let config = RetrievalConfig {
            use_sparse: false,
            ..RetrievalConfig::default()
        };
        let searcher =
            HybridSearcher::new(Arc::clone(&shared) as Arc<dyn VectorIndex>, Arc::new(config));

        searcher
            .search(&vec![0.1], &sparse_vector(), 5, &BoostContext::default(), None)
            .await
            .unwrap();
        assert_eq!(*shared.calls.lock(), vec!["dense".to_string()]);
    }

    #[tokio::test]
    async fn test_sparse_leg_failure_degrades_to_dense() {
        let index = ScriptedIndex::new(
            Ok(vec![index_hit("a", "alpha"), index_hit("b", "beta")]),
            Err(()),
        );
        let searcher = searcher(index);

        let hits = searcher
            .search(&vec![0.1], &sparse_vector(), 5, &BoostContext::default(), None)
            .await
            .unwrap();

        // Dense-only fused scores; nothing propagated.
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert!((hits[0].rrf_score.unwrap() - 0.5 / 61.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_all_legs_failing_is_an_error() {
        let index = ScriptedIndex::new(Err(()), Err(()));
        let searcher = searcher(index);

        let result = searcher
            .search(&vec![0.1], &sparse_vector(), 5, &BoostContext::default(), None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_dense_failure_with_sparse_disabled_is_an_error() {
        let index = ScriptedIndex::new(Err(()), Ok(vec![index_hit("b", "beta")]));
        let searcher = searcher(index);

        let result = searcher
            .search(
                &vec![0.1],
                &SparseVector::empty(),
                5,
                &BoostContext::default(),
                None,
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_dense_failure_degrades_to_sparse() {
        let index = ScriptedIndex::new(Err(()), Ok(vec![index_hit("b", "beta")]));
        let searcher = searcher(index);

        let hits = searcher
            .search(&vec![0.1], &sparse_vector(), 5, &BoostContext::default(), None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[tokio::test]
    async fn test_truncates_to_k() {
        let dense: Vec<IndexHit> = (0..10)
            .map(|i| index_hit(&format!("d{i}"), "text"))
            .collect();
        let index = ScriptedIndex::new(Ok(dense), Ok(vec![]));
        let searcher = searcher(index);

        let hits = searcher
            .search(
                &vec![0.1],
                &SparseVector::empty(),
                3,
                &BoostContext::default(),
                None,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_boosted_scores_filled_and_positive() {
        let index = ScriptedIndex::new(
            Ok(vec![index_hit("a", "## структурированный\n\nпример")]),
            Ok(vec![]),
        );
        let searcher = searcher(index);

        let hits = searcher
            .search(
                &vec![0.1],
                &SparseVector::empty(),
                5,
                &BoostContext::default(),
                None,
            )
            .await
            .unwrap();

        let hit = &hits[0];
        assert!(hit.boosted_score.unwrap() >= hit.rrf_score.unwrap());
        assert!(hit.rrf_score.unwrap() > 0.0);
    }

    #[test]
    fn test_leg_limit_doubles_k() {
        assert_eq!(leg_limit(20), 40);
        assert_eq!(leg_limit(1), 2);
    }
}
