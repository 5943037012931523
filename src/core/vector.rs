//! Query vector representations.
//!
//! Dense vectors are fixed-dimension f32 embeddings queried by cosine
//! similarity; sparse vectors are token-id → weight maps queried by
//! dot-product. The sparse form is serialized as two parallel arrays
//! (`indices`, `values`) to match the index wire protocol.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed-dimension dense embedding.
///
/// The dimension is a deployment constant (e.g. 1024 for BGE-M3); it is
/// validated against configuration at the embedder seam, not here.
pub type DenseVector = Vec<f32>;

/// Sparse lexical vector: parallel `indices`/`values` arrays.
///
/// Entries with non-positive weight are dropped on construction; an empty
/// sparse vector disables the sparse search leg entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    /// Token ids, parallel to `values`.
    pub indices: Vec<u32>,
    /// Positive weights, parallel to `indices`.
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Creates an empty sparse vector (sparse leg will be skipped).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Builds a sparse vector from a token-id → weight map.
    ///
    /// Non-positive weights are discarded. Entry order follows ascending
    /// token id so the result is deterministic.
    #[must_use]
    pub fn from_weights(weights: &HashMap<u32, f32>) -> Self {
        let mut entries: Vec<(u32, f32)> = weights
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(i, w)| (*i, *w))
            .collect();
        entries.sort_unstable_by_key(|(i, _)| *i);

        let mut indices = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len());
        for (i, w) in entries {
            indices.push(i);
            values.push(w);
        }
        Self { indices, values }
    }

    /// Number of non-zero entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len().min(self.values.len())
    }

    /// Returns true if the vector carries no entries.
    ///
    /// Both arrays must be non-empty for the vector to count as usable;
    /// a mismatched pair is treated as empty rather than sent to the index.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty() || self.values.is_empty()
    }

    /// Keeps only the `k` entries with the largest weights.
    ///
    /// Optional recall/latency trade-off applied to embedder output before
    /// search; a no-op when the vector already fits.
    #[must_use]
    pub fn pruned_to_top_k(&self, k: usize) -> Self {
        if self.len() <= k {
            return self.clone();
        }
        let mut entries: Vec<(u32, f32)> = self
            .indices
            .iter()
            .copied()
            .zip(self.values.iter().copied())
            .collect();
        entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        entries.truncate(k);
        entries.sort_unstable_by_key(|(i, _)| *i);

        let mut indices = Vec::with_capacity(k);
        let mut values = Vec::with_capacity(k);
        for (i, w) in entries {
            indices.push(i);
            values.push(w);
        }
        Self { indices, values }
    }
}
