//! Search hit representation.
//!
//! A [`Hit`] starts life as a raw index result and picks up scores as it
//! moves through the pipeline: `rrf_score` after fusion, `boosted_score`
//! after the boost pass. Boosts are multiplicative and positive, so
//! `boosted_score >= rrf_score > 0` holds for every boosted hit.

use serde::{Deserialize, Serialize};

use super::payload::ChunkPayload;

/// One search result flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Stable point id from the index.
    pub id: String,

    /// Raw similarity score reported by the index.
    pub score: f32,

    /// Chunk payload (or its merged form after auto-merge).
    pub payload: ChunkPayload,

    /// Fused score, filled by RRF.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrf_score: Option<f64>,

    /// Boosted score, filled by the boost pass (and nudged by the additive
    /// theme boost in the pipeline).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boosted_score: Option<f64>,
}

impl Hit {
    /// Creates a hit from a raw index result.
    #[must_use]
    pub const fn new(id: String, score: f32, payload: ChunkPayload) -> Self {
        Self {
            id,
            score,
            payload,
            rrf_score: None,
            boosted_score: None,
        }
    }

    /// Best available ranking score: boosted, else fused, else raw.
    #[must_use]
    pub fn ranking_score(&self) -> f64 {
        self.boosted_score
            .or(self.rrf_score)
            .unwrap_or(f64::from(self.score))
    }
}
