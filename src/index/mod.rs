//! Vector index interface.
//!
//! The core never owns chunk records or their vectors; it talks to an
//! external index (Qdrant-shaped) through this trait. Implementations
//! handle the transport layer while presenting named-vector search and
//! filtered scrolling to the pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{DenseVector, SparseVector};
use crate::error::IndexError;

/// One raw result row from the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    /// Stable point id.
    pub id: String,
    /// Similarity score (cosine for dense, dot-product for sparse).
    pub score: f32,
    /// Raw payload map as stored in the index.
    #[serde(default)]
    pub payload: Map<String, Value>,
}

/// Query vector for one search leg, tagged with its named-vector slot.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryVector {
    /// Dense embedding, searched by cosine similarity.
    Dense(DenseVector),
    /// Sparse lexical vector, searched by dot-product.
    Sparse(SparseVector),
}

impl QueryVector {
    /// Named-vector slot this query targets.
    #[must_use]
    pub const fn vector_name(&self) -> &'static str {
        match self {
            Self::Dense(_) => "dense",
            Self::Sparse(_) => "sparse",
        }
    }
}

/// Single equality predicate over a payload field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCondition {
    /// Payload field name.
    pub field: String,
    /// Literal the field must equal.
    pub value: String,
}

/// Conjunction of equality predicates, translated by implementations to
/// the index's native filter protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    /// All conditions must hold.
    pub conditions: Vec<FieldCondition>,
}

impl MetadataFilter {
    /// Creates an empty filter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// Adds an equality condition.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push(FieldCondition {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Returns true when no conditions were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Convenience constructor for a `doc_id == X` scroll filter.
    #[must_use]
    pub fn doc_id(doc_id: impl Into<String>) -> Self {
        Self::new().with("doc_id", doc_id)
    }
}

/// One page of scroll results plus the cursor for the next page.
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    /// Records in this page.
    pub hits: Vec<IndexHit>,
    /// Opaque cursor; `None` means the scroll is exhausted.
    pub next_offset: Option<String>,
}

/// Trait for vector index backends.
///
/// Implementations must be thread-safe (`Send + Sync`); one client instance
/// is shared across all in-flight requests.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Searches one named-vector slot.
    ///
    /// `accuracy` is the search-time effort knob (HNSW `ef`), passed
    /// through to the index unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] on transport or index failures.
    async fn search(
        &self,
        collection: &str,
        vector: &QueryVector,
        limit: u32,
        filter: Option<&MetadataFilter>,
        accuracy: u32,
    ) -> Result<Vec<IndexHit>, IndexError>;

    /// Fetches records matching `filter`, one page at a time.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] on transport or index failures.
    async fn scroll(
        &self,
        collection: &str,
        filter: &MetadataFilter,
        limit: u32,
        offset: Option<String>,
    ) -> Result<ScrollPage, IndexError>;
}
