//! Per-chunk payload attached to every index record.
//!
//! The payload has a small typed core (identity, text, facets) plus an
//! opaque extension map. Unrecognized keys survive deserialize → serialize
//! round trips untouched; the pipeline never interprets them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Inclusive chunk-index range covered by a merged window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpan {
    /// First chunk index in the window.
    pub start: u32,
    /// Last chunk index in the window.
    pub end: u32,
}

/// Metadata carried by one chunk of a source document.
///
/// `doc_id` and `chunk_index` identify the chunk within its document; both
/// are optional here because degraded index records without them still flow
/// through the pipeline (they simply bypass auto-merge).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Document identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,

    /// Position of this chunk within its document (0-based, unique per doc).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,

    /// Stable chunk identifier (e.g. `doc-1#2`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,

    /// Chunk text.
    #[serde(default)]
    pub text: String,

    /// Document title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Page URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Canonical page URL. Preferred over `url` when both are present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,

    /// Documentation domain facet (e.g. `sdk_docs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Section facet (e.g. `admin`, `api`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    /// Platform facet (e.g. `android`, `ios`, `web`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Role facet (e.g. `agent`, `supervisor`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Page type used for metadata boosts (e.g. `faq`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_type: Option<String>,

    /// Directory-group labels for group boosting.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups_path: Vec<String>,

    /// Ingestion source label (e.g. `official-docs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Character length of the chunk content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,

    /// Human-readable theme label attached on output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_label: Option<String>,

    /// True when this payload is a merged neighbor window.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_merged: bool,

    /// Chunk indices folded into the window, in ascending order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_chunk_indices: Option<Vec<u32>>,

    /// Number of chunks folded into the window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_chunk_count: Option<usize>,

    /// Inclusive index range of the window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_span: Option<ChunkSpan>,

    /// Chunk ids folded into the window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_chunk_ids: Option<Vec<String>>,

    /// Text length before context optimization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_length: Option<usize>,

    /// Text length after context optimization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimized_length: Option<usize>,

    /// True when the list-intent extraction mode produced this payload.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub list_mode: bool,

    /// Unrecognized payload keys, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChunkPayload {
    /// Builds a payload from a raw index payload map.
    ///
    /// Unknown keys land in `extra`. A map that fails to deserialize
    /// entirely (wrong types on typed fields) degrades to an empty payload
    /// carrying everything in `extra`, so a malformed record never kills
    /// the request.
    #[must_use]
    pub fn from_index_map(map: Map<String, Value>) -> Self {
        match serde_json::from_value(Value::Object(map.clone())) {
            Ok(payload) => payload,
            Err(_) => Self {
                extra: map,
                ..Self::default()
            },
        }
    }

    /// URL used for boosting and deduplication.
    ///
    /// Prefers `canonical_url`, falls back to `url`. The corpus carries
    /// both fields inconsistently; `ragcore-rs validate` surfaces this to
    /// the operator.
    #[must_use]
    pub fn effective_url(&self) -> Option<&str> {
        self.canonical_url.as_deref().or(self.url.as_deref())
    }

    /// Content length, falling back to the text length when unset.
    #[must_use]
    pub fn effective_content_length(&self) -> usize {
        self.content_length.unwrap_or(self.text.len())
    }
}
