//! Reciprocal Rank Fusion (RRF) for the two search legs.
//!
//! Combines the dense and sparse ranked lists into a single fused ranking.
//! Based on: Cormack, Clarke, Buettcher (2009) - "Reciprocal Rank Fusion
//! outperforms Condorcet and individual Rank Learning Methods"

use std::collections::HashMap;

use crate::core::{ChunkPayload, Hit};
use crate::index::IndexHit;

/// Configuration for weighted RRF fusion.
#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    /// The k parameter controls how much weight is given to lower-ranked
    /// items. Default is 60, the value recommended in the original paper.
    pub k: u32,
    /// Weight of the dense leg's contributions.
    pub dense_weight: f64,
    /// Weight of the sparse leg's contributions.
    pub sparse_weight: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            k: 60,
            dense_weight: 0.5,
            sparse_weight: 0.5,
        }
    }
}

/// Fuses the dense and sparse result lists into hits ranked by RRF score.
///
/// For each id the score accumulates `w_leg / (k + rank)` over the legs
/// that contain it, with 1-based ranks. When an id appears in both legs
/// the dense-side payload wins (deterministic tie-break). Output order is
/// score-descending with a stable tie-break on first appearance
/// (dense list first, then sparse newcomers).
#[must_use]
pub fn fuse(dense: &[IndexHit], sparse: &[IndexHit], config: &FusionConfig) -> Vec<Hit> {
    let mut scores: HashMap<&str, f64> = HashMap::new();
    let mut items: HashMap<&str, &IndexHit> = HashMap::new();
    let mut first_seen: Vec<&str> = Vec::with_capacity(dense.len() + sparse.len());

    for (rank, hit) in dense.iter().enumerate() {
        let contribution = config.dense_weight / f64::from(config.k + rank_u32(rank));
        let entry = scores.entry(hit.id.as_str()).or_insert(0.0);
        if items.insert(hit.id.as_str(), hit).is_none() {
            first_seen.push(hit.id.as_str());
        }
        *entry += contribution;
    }

    for (rank, hit) in sparse.iter().enumerate() {
        let contribution = config.sparse_weight / f64::from(config.k + rank_u32(rank));
        let entry = scores.entry(hit.id.as_str()).or_insert(0.0);
        // Keep the dense-side payload when the id was already seen.
        if !items.contains_key(hit.id.as_str()) {
            items.insert(hit.id.as_str(), hit);
            first_seen.push(hit.id.as_str());
        }
        *entry += contribution;
    }

    let mut fused: Vec<Hit> = first_seen
        .into_iter()
        .filter_map(|id| {
            let item = items.get(id)?;
            let score = scores.get(id).copied()?;
            let mut hit = Hit::new(
                item.id.clone(),
                item.score,
                ChunkPayload::from_index_map(item.payload.clone()),
            );
            hit.rrf_score = Some(score);
            Some(hit)
        })
        .collect();

    // Stable sort: equal scores keep first-appearance order.
    fused.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused
}

#[allow(clippy::cast_possible_truncation)]
fn rank_u32(zero_based: usize) -> u32 {
    // rank is 1-based in the RRF formula
    (zero_based as u32).saturating_add(1)
}
