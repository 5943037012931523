//! Embedding interface.
//!
//! The core consumes embeddings through an opaque [`Embedder`]; model
//! execution (BGE-M3 or compatible) lives outside the crate. A single
//! `embed` call produces both the dense vector and the sparse lexical
//! weights for one text.

use async_trait::async_trait;

use crate::core::{DenseVector, SparseVector};
use crate::error::EmbeddingError;

/// Default dense dimension for the BGE-M3 model family.
///
/// This is the authoritative dimension constant; deployments with a
/// different model override it via configuration.
pub const DEFAULT_DIMENSIONS: usize = 1024;

/// Whether a text is embedded as a query or as a document.
///
/// Asymmetric models encode the two sides differently; the index stores
/// document-side vectors, the pipeline only ever produces query-side ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    /// Query-side encoding.
    Query,
    /// Document-side encoding.
    Document,
}

/// Dense + sparse output for one embedded text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryEmbedding {
    /// Dense embedding vector.
    pub dense: DenseVector,
    /// Sparse lexical weights; may be empty when the model (or the
    /// deployment) does not produce them.
    pub sparse: SparseVector,
}

/// Trait for embedding backends.
///
/// Implementations must be thread-safe (`Send + Sync`); one client instance
/// is shared across all in-flight requests.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the dense embedding dimension.
    fn dimensions(&self) -> usize;

    /// Embeds one text, truncated to `max_length` model tokens.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError`] if the backend fails or times out.
    async fn embed(
        &self,
        text: &str,
        max_length: usize,
        kind: EmbedKind,
    ) -> Result<QueryEmbedding, EmbeddingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn dimensions(&self) -> usize {
            4
        }

        async fn embed(
            &self,
            text: &str,
            _max_length: usize,
            _kind: EmbedKind,
        ) -> Result<QueryEmbedding, EmbeddingError> {
            if text.is_empty() {
                return Err(EmbeddingError::Failed("empty input".to_string()));
            }
            Ok(QueryEmbedding {
                dense: vec![1.0, 0.0, 0.0, 0.0],
                sparse: SparseVector::empty(),
            })
        }
    }

    #[tokio::test]
    async fn test_embedder_trait_object() {
        let embedder: Box<dyn Embedder> = Box::new(FixedEmbedder);
        assert_eq!(embedder.dimensions(), 4);

        let out = embedder.embed("hello", 512, EmbedKind::Query).await.unwrap();
        assert_eq!(out.dense.len(), 4);
        assert!(out.sparse.is_empty());
    }

    #[tokio::test]
    async fn test_embedder_error_path() {
        let embedder = FixedEmbedder;
        let err = embedder.embed("", 512, EmbedKind::Query).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Failed(_)));
    }
}
