//! Cross-encoder reranker interface.
//!
//! Pure scoring: the reranker assigns one relevance score per candidate
//! text and never reorders anything itself. Ordering and truncation
//! decisions stay with the caller.

use async_trait::async_trait;

use crate::error::RerankError;

/// Trait for reranker backends.
///
/// Implementations must be thread-safe (`Send + Sync`); one client instance
/// is shared across all in-flight requests.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Scores `documents` against `query`, one score per document, in
    /// input order.
    ///
    /// `batch_size` is a hint for backends that tokenize and infer in
    /// batches; implementations may ignore it.
    ///
    /// # Errors
    ///
    /// Returns [`RerankError`] if scoring fails or the backend returns a
    /// score list of the wrong length.
    async fn score(
        &self,
        query: &str,
        documents: &[String],
        batch_size: usize,
    ) -> Result<Vec<f32>, RerankError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LengthReranker;

    #[async_trait]
    impl Reranker for LengthReranker {
        async fn score(
            &self,
            _query: &str,
            documents: &[String],
            _batch_size: usize,
        ) -> Result<Vec<f32>, RerankError> {
            #[allow(clippy::cast_precision_loss)]
            Ok(documents.iter().map(|d| d.len() as f32).collect())
        }
    }

    #[tokio::test]
    async fn test_reranker_scores_in_input_order() {
        let reranker = LengthReranker;
        let docs = vec!["aa".to_string(), "a".to_string(), "aaaa".to_string()];
        let scores = reranker.score("q", &docs, 20).await.unwrap();
        assert_eq!(scores, vec![2.0, 1.0, 4.0]);
    }
}
