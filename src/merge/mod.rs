//! Neighbor auto-merge.
//!
//! Expands each retrieved chunk into the largest contiguous window of its
//! document that fits a token budget, without overlapping windows already
//! claimed for the same document in this request. Hits that cannot be
//! merged (missing identity, unknown position, fetch failure) pass through
//! unchanged, and hits already tagged `auto_merged` are left alone so the
//! operation is idempotent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::{ChunkCache, DocChunk, DocChunkSequence};
use crate::core::{ChunkPayload, ChunkSpan, Hit};
use crate::tokenizer::TokenEstimator;

/// Source of complete per-document chunk sequences.
///
/// [`ChunkCache`] is the production implementation; tests inject fixtures.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Returns the ordered chunk sequence for `doc_id`; empty on failure.
    async fn doc_chunks(&self, doc_id: &str) -> DocChunkSequence;
}

#[async_trait]
impl ChunkSource for ChunkCache {
    async fn doc_chunks(&self, doc_id: &str) -> DocChunkSequence {
        self.get(doc_id).await
    }
}

/// Identity of one produced window: `(doc_id, chunk indices)`.
type WindowKey = (String, Vec<u32>);

/// Expands hits into token-bounded neighbor windows.
pub struct AutoMerger {
    source: Arc<dyn ChunkSource>,
    estimator: Arc<dyn TokenEstimator>,
}

impl AutoMerger {
    /// Creates a merger over the shared chunk source and token estimator.
    #[must_use]
    pub fn new(source: Arc<dyn ChunkSource>, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { source, estimator }
    }

    /// Merges adjacent chunks of the same document into windows bounded by
    /// `max_window_tokens`.
    ///
    /// Preserves first-occurrence order; the output is never longer than
    /// the input. A `max_window_tokens` of zero disables merging.
    pub async fn merge(&self, hits: &[Hit], max_window_tokens: u32) -> Vec<Hit> {
        if hits.is_empty() {
            return Vec::new();
        }
        if max_window_tokens == 0 {
            return hits.to_vec();
        }

        // Group mergeable hits by document. Hits without identity, and
        // windows from a previous merge pass, stay as-is; positions claimed
        // by previous-pass windows are pre-marked so fresh windows cannot
        // grow into them (this is what makes merge idempotent).
        let mut doc_hits: HashMap<&str, Vec<(u32, &Hit)>> = HashMap::new();
        let mut claimed_indices: HashMap<&str, Vec<u32>> = HashMap::new();
        for hit in hits {
            let Some(doc_id) = hit.payload.doc_id.as_deref() else {
                continue;
            };
            if hit.payload.auto_merged {
                let claimed = claimed_indices.entry(doc_id).or_default();
                if let Some(indices) = hit.payload.merged_chunk_indices.as_ref() {
                    claimed.extend(indices.iter().copied());
                } else if let Some(chunk_index) = hit.payload.chunk_index {
                    claimed.push(chunk_index);
                }
                continue;
            }
            if let Some(chunk_index) = hit.payload.chunk_index {
                doc_hits.entry(doc_id).or_default().push((chunk_index, hit));
            }
        }

        let mut window_map: HashMap<(String, u32), (WindowKey, Hit)> = HashMap::new();

        for (doc_id, mut items) in doc_hits {
            let doc_chunks = self.source.doc_chunks(doc_id).await;
            if doc_chunks.is_empty() {
                // Fetch failed or document unknown: every hit degrades to a
                // trivial window of itself.
                for (chunk_index, hit) in items {
                    window_map.insert(
                        (doc_id.to_string(), chunk_index),
                        ((doc_id.to_string(), vec![chunk_index]), (*hit).clone()),
                    );
                }
                continue;
            }

            let positions: HashMap<u32, usize> = doc_chunks
                .iter()
                .enumerate()
                .filter_map(|(pos, chunk)| chunk.payload.chunk_index.map(|ci| (ci, pos)))
                .collect();
            let mut covered: HashSet<usize> = claimed_indices
                .get(doc_id)
                .map(|claimed| {
                    claimed
                        .iter()
                        .filter_map(|index| positions.get(index).copied())
                        .collect()
                })
                .unwrap_or_default();

            items.sort_by_key(|(chunk_index, _)| *chunk_index);

            for (chunk_index, hit) in items {
                let Some(&pos) = positions.get(&chunk_index) else {
                    window_map.insert(
                        (doc_id.to_string(), chunk_index),
                        ((doc_id.to_string(), vec![chunk_index]), hit.clone()),
                    );
                    continue;
                };

                if covered.contains(&pos)
                    && window_map.contains_key(&(doc_id.to_string(), chunk_index))
                {
                    continue;
                }

                let (start, end) =
                    self.expand_window(&doc_chunks, pos, &covered, max_window_tokens);
                covered.extend(start..=end);

                let window_positions: Vec<usize> = (start..=end).collect();
                let merged_indices: Vec<u32> = window_positions
                    .iter()
                    .filter_map(|&p| doc_chunks[p].payload.chunk_index)
                    .collect();

                let merged_hit = if merged_indices.len() > 1 {
                    build_merged_hit(hit, &doc_chunks, &window_positions)
                } else {
                    hit.clone()
                };

                let window_key: WindowKey = (doc_id.to_string(), merged_indices.clone());
                for idx in merged_indices {
                    window_map.insert(
                        (doc_id.to_string(), idx),
                        (window_key.clone(), merged_hit.clone()),
                    );
                }
            }
        }

        // Rebuild in original order, emitting each window exactly once.
        let mut result: Vec<Hit> = Vec::with_capacity(hits.len());
        let mut seen_windows: HashSet<WindowKey> = HashSet::new();

        for hit in hits {
            let identity = if hit.payload.auto_merged {
                None
            } else {
                hit.payload
                    .doc_id
                    .as_deref()
                    .zip(hit.payload.chunk_index)
            };
            let Some((doc_id, chunk_index)) = identity else {
                result.push(hit.clone());
                continue;
            };

            if let Some((window_key, merged_hit)) =
                window_map.get(&(doc_id.to_string(), chunk_index))
            {
                if seen_windows.insert(window_key.clone()) {
                    result.push(merged_hit.clone());
                }
            } else {
                let window_key: WindowKey = (doc_id.to_string(), vec![chunk_index]);
                if seen_windows.insert(window_key) {
                    result.push(hit.clone());
                }
            }
        }

        if result.len() != hits.len() {
            debug!(
                input = hits.len(),
                output = result.len(),
                "auto-merge collapsed neighboring chunks"
            );
        }
        result
    }

    /// Greedy symmetric expansion around `pos`, bounded by the budget and
    /// by positions already claimed for this document.
    fn expand_window(
        &self,
        doc_chunks: &[DocChunk],
        pos: usize,
        covered: &HashSet<usize>,
        max_window_tokens: u32,
    ) -> (usize, usize) {
        let mut start = pos;
        let mut end = pos;
        let mut tokens = self.estimator.estimate(&doc_chunks[pos].payload.text);

        loop {
            let mut expanded = false;

            if start > 0 && !covered.contains(&(start - 1)) {
                let candidate = self.estimator.estimate(&doc_chunks[start - 1].payload.text);
                if tokens.saturating_add(candidate) <= max_window_tokens {
                    start -= 1;
                    tokens += candidate;
                    expanded = true;
                }
            }
            if end + 1 < doc_chunks.len() && !covered.contains(&(end + 1)) {
                let candidate = self.estimator.estimate(&doc_chunks[end + 1].payload.text);
                if tokens.saturating_add(candidate) <= max_window_tokens {
                    end += 1;
                    tokens += candidate;
                    expanded = true;
                }
            }

            if !expanded {
                break;
            }
        }

        (start, end)
    }
}

/// Builds the merged hit for a window of more than one chunk.
///
/// Scores and non-derived payload fields come from the original hit; text,
/// lengths and the merge bookkeeping fields are recomputed from the window.
fn build_merged_hit(base: &Hit, doc_chunks: &[DocChunk], window_positions: &[usize]) -> Hit {
    let mut texts: Vec<&str> = Vec::with_capacity(window_positions.len());
    let mut chunk_indices: Vec<u32> = Vec::with_capacity(window_positions.len());
    let mut chunk_ids: Vec<String> = Vec::with_capacity(window_positions.len());

    for &pos in window_positions {
        let chunk = &doc_chunks[pos];
        let trimmed = chunk.payload.text.trim();
        if !trimmed.is_empty() {
            texts.push(trimmed);
        }
        if let Some(index) = chunk.payload.chunk_index {
            chunk_indices.push(index);
        }
        let chunk_id = chunk
            .payload
            .chunk_id
            .clone()
            .unwrap_or_else(|| chunk.id.clone());
        if !chunk_id.is_empty() {
            chunk_ids.push(chunk_id);
        }
    }

    let merged_text = texts.join("\n\n").trim().to_string();

    let mut merged = base.clone();
    let payload: &mut ChunkPayload = &mut merged.payload;
    if !merged_text.is_empty() {
        payload.content_length = Some(merged_text.len());
        payload.text = merged_text;
    }
    payload.auto_merged = true;
    payload.merged_chunk_count = Some(window_positions.len());
    payload.chunk_span = match (chunk_indices.first(), chunk_indices.last()) {
        (Some(&start), Some(&end)) => Some(ChunkSpan { start, end }),
        _ => payload
            .chunk_index
            .map(|i| ChunkSpan { start: i, end: i }),
    };
    payload.merged_chunk_indices = Some(chunk_indices);
    if !chunk_ids.is_empty() {
        payload.merged_chunk_ids = Some(chunk_ids);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::HeuristicEstimator;

    /// Fixture chunk source with canned sequences per document.
    struct FixtureSource {
        docs: HashMap<String, Vec<DocChunk>>,
    }

    impl FixtureSource {
        fn new() -> Self {
            Self {
                docs: HashMap::new(),
            }
        }

        fn with_doc(mut self, doc_id: &str, chunks: Vec<(u32, &str)>) -> Self {
            let chunks = chunks
                .into_iter()
                .map(|(index, text)| DocChunk {
                    id: format!("{doc_id}#{index}"),
                    payload: ChunkPayload {
                        doc_id: Some(doc_id.to_string()),
                        chunk_index: Some(index),
                        chunk_id: Some(format!("{doc_id}#{index}")),
                        text: text.to_string(),
                        ..ChunkPayload::default()
                    },
                })
                .collect();
            self.docs.insert(doc_id.to_string(), chunks);
            self
        }
    }

    #[async_trait]
    impl ChunkSource for FixtureSource {
        async fn doc_chunks(&self, doc_id: &str) -> DocChunkSequence {
            Arc::from(self.docs.get(doc_id).cloned().unwrap_or_default())
        }
    }

    fn merger(source: FixtureSource) -> AutoMerger {
        AutoMerger::new(Arc::new(source), Arc::new(HeuristicEstimator))
    }

    fn hit(doc_id: &str, chunk_index: u32, text: &str) -> Hit {
        let mut hit = Hit::new(
            format!("{doc_id}-{chunk_index}"),
            0.5,
            ChunkPayload {
                doc_id: Some(doc_id.to_string()),
                chunk_index: Some(chunk_index),
                chunk_id: Some(format!("{doc_id}#{chunk_index}")),
                text: text.to_string(),
                ..ChunkPayload::default()
            },
        );
        hit.rrf_score = Some(0.02);
        hit.boosted_score = Some(0.03);
        hit
    }

    /// Text of exactly `tokens * 4` chars so the heuristic estimator sees
    /// the given token count.
    fn text_of_tokens(tokens: usize) -> String {
        "a".repeat(tokens * 4)
    }

    #[tokio::test]
    async fn test_empty_input() {
        let merger = merger(FixtureSource::new());
        assert!(merger.merge(&[], 200).await.is_empty());
    }

    #[tokio::test]
    async fn test_whole_document_fits_budget() {
        // Three chunks of 60/70/80 tokens; a 250 window merges the whole
        // document around a hit on the middle chunk.
        let source = FixtureSource::new().with_doc(
            "doc-1",
            vec![
                (0, &text_of_tokens(60)),
                (1, &text_of_tokens(70)),
                (2, &text_of_tokens(80)),
            ],
        );
        let merger = merger(source);
        let hits = vec![hit("doc-1", 1, &text_of_tokens(70))];

        let merged = merger.merge(&hits, 250).await;

        assert_eq!(merged.len(), 1);
        let payload = &merged[0].payload;
        assert!(payload.auto_merged);
        assert_eq!(payload.merged_chunk_indices.as_deref(), Some(&[0, 1, 2][..]));
        assert_eq!(payload.chunk_span, Some(ChunkSpan { start: 0, end: 2 }));
        assert_eq!(payload.merged_chunk_count, Some(3));
        // Text joined with a blank line between chunks.
        assert_eq!(payload.text.matches("\n\n").count(), 2);
        // Scores are the original hit's.
        assert_eq!(merged[0].boosted_score, Some(0.03));
    }

    #[tokio::test]
    async fn test_budget_stops_expansion() {
        // 60+70 fits into 130 exactly; the 80-token neighbor does not.
        let source = FixtureSource::new().with_doc(
            "doc-1",
            vec![
                (0, &text_of_tokens(60)),
                (1, &text_of_tokens(70)),
                (2, &text_of_tokens(80)),
            ],
        );
        let merger = merger(source);
        let hits = vec![hit("doc-1", 1, &text_of_tokens(70))];

        let merged = merger.merge(&hits, 130).await;

        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[0].payload.merged_chunk_indices.as_deref(),
            Some(&[0, 1][..])
        );
        assert_eq!(
            merged[0].payload.chunk_span,
            Some(ChunkSpan { start: 0, end: 1 })
        );
    }

    #[tokio::test]
    async fn test_distinct_docs_without_neighbors_pass_through() {
        let source = FixtureSource::new()
            .with_doc("doc-a", vec![(0, "only chunk")])
            .with_doc("doc-b", vec![(0, "solo")]);
        let merger = merger(source);
        let hits = vec![hit("doc-a", 0, "only chunk"), hit("doc-b", 0, "solo")];

        let merged = merger.merge(&hits, 200).await;

        assert_eq!(merged.len(), 2);
        assert!(!merged[0].payload.auto_merged);
        assert!(!merged[1].payload.auto_merged);
        assert_eq!(merged[0].payload, hits[0].payload);
        assert_eq!(merged[1].payload, hits[1].payload);
    }

    #[tokio::test]
    async fn test_two_hits_collapse_into_one_window() {
        let source = FixtureSource::new().with_doc(
            "doc-1",
            vec![(1, "Intro segment"), (2, "Chunk-2 snippet"), (3, "Chunk-3 snippet"), (4, "Outro")],
        );
        let merger = merger(source);
        let hits = vec![
            hit("doc-1", 2, "Chunk-2 snippet"),
            hit("doc-1", 3, "Chunk-3 snippet"),
        ];

        let merged = merger.merge(&hits, 20).await;

        assert_eq!(merged.len(), 1);
        let payload = &merged[0].payload;
        assert!(payload.auto_merged);
        let indices = payload.merged_chunk_indices.as_deref().unwrap();
        assert!(indices.contains(&2));
        assert!(indices.contains(&3));
        assert!(payload.text.contains("Chunk-2"));
        assert!(payload.text.contains("Chunk-3"));
    }

    #[tokio::test]
    async fn test_order_preserved_with_orphan_between() {
        let source = FixtureSource::new().with_doc(
            "doc-x",
            vec![
                (0, "Head section"),
                (1, "Mid part A"),
                (2, "Mid part B"),
                (3, "Tail section"),
            ],
        );
        let merger = merger(source);

        let mut orphan = Hit::new(
            "standalone".to_string(),
            0.4,
            ChunkPayload {
                text: "orphan context".to_string(),
                ..ChunkPayload::default()
            },
        );
        orphan.rrf_score = Some(0.01);

        let hits = vec![
            hit("doc-x", 0, "Head section"),
            orphan,
            hit("doc-x", 3, "Tail section"),
        ];

        // Budget of 4 tokens: nothing can expand.
        let merged = merger.merge(&hits, 4).await;

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].payload.text, "Head section");
        assert_eq!(merged[1].payload.text, "orphan context");
        assert_eq!(merged[2].payload.text, "Tail section");
        assert!(!merged[0].payload.auto_merged);
        assert!(!merged[2].payload.auto_merged);
    }

    #[tokio::test]
    async fn test_windows_never_overlap() {
        // Two hits far enough apart that each grows its own window; the
        // second window must not claim positions of the first.
        let source = FixtureSource::new().with_doc(
            "doc-1",
            vec![
                (0, &text_of_tokens(10)),
                (1, &text_of_tokens(10)),
                (2, &text_of_tokens(10)),
                (3, &text_of_tokens(10)),
                (4, &text_of_tokens(10)),
                (5, &text_of_tokens(10)),
            ],
        );
        let merger = merger(source);
        let hits = vec![
            hit("doc-1", 1, &text_of_tokens(10)),
            hit("doc-1", 4, &text_of_tokens(10)),
        ];

        let merged = merger.merge(&hits, 30).await;

        let mut all_indices: Vec<u32> = Vec::new();
        for hit in &merged {
            if let Some(indices) = hit.payload.merged_chunk_indices.as_deref() {
                all_indices.extend_from_slice(indices);
            } else if let Some(index) = hit.payload.chunk_index {
                all_indices.push(index);
            }
        }
        let unique: HashSet<u32> = all_indices.iter().copied().collect();
        assert_eq!(unique.len(), all_indices.len(), "windows overlap");

        // Spans must be disjoint.
        let spans: Vec<ChunkSpan> = merged
            .iter()
            .filter_map(|h| h.payload.chunk_span)
            .collect();
        for (i, a) in spans.iter().enumerate() {
            for b in spans.iter().skip(i + 1) {
                assert!(a.end < b.start || b.end < a.start);
            }
        }
    }

    #[tokio::test]
    async fn test_oversized_single_chunk_is_kept() {
        // A chunk over the budget still comes back, unmerged.
        let source = FixtureSource::new().with_doc("doc-1", vec![(0, &text_of_tokens(500))]);
        let merger = merger(source);
        let hits = vec![hit("doc-1", 0, &text_of_tokens(500))];

        let merged = merger.merge(&hits, 100).await;
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].payload.auto_merged);
    }

    #[tokio::test]
    async fn test_single_chunk_document_verbatim() {
        let source = FixtureSource::new().with_doc("doc-1", vec![(0, "lonely")]);
        let merger = merger(source);
        let hits = vec![hit("doc-1", 0, "lonely")];

        let merged = merger.merge(&hits, 1000).await;
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].payload, hits[0].payload);
    }

    #[tokio::test]
    async fn test_fetch_failure_passes_hits_through() {
        // doc-unknown has no fixture: simulates a failed scroll.
        let source = FixtureSource::new();
        let merger = merger(source);
        let hits = vec![hit("doc-unknown", 2, "text"), hit("doc-unknown", 7, "more")];

        let merged = merger.merge(&hits, 200).await;
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].payload, hits[0].payload);
        assert_eq!(merged[1].payload, hits[1].payload);
    }

    #[tokio::test]
    async fn test_unknown_position_passes_through() {
        // The hit's chunk_index does not exist in the document sequence.
        let source = FixtureSource::new().with_doc("doc-1", vec![(0, "zero"), (1, "one")]);
        let merger = merger(source);
        let hits = vec![hit("doc-1", 9, "ghost")];

        let merged = merger.merge(&hits, 200).await;
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].payload.text, "ghost");
    }

    #[tokio::test]
    async fn test_idempotence_on_merged_output() {
        let source = FixtureSource::new().with_doc(
            "doc-1",
            vec![(0, "alpha"), (1, "beta"), (2, "gamma")],
        );
        let merger = merger(source);
        let hits = vec![hit("doc-1", 1, "beta")];

        let once = merger.merge(&hits, 1000).await;
        let twice = merger.merge(&once, 1000).await;
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_zero_budget_disables_merging() {
        let source = FixtureSource::new().with_doc("doc-1", vec![(0, "a"), (1, "b")]);
        let merger = merger(source);
        let hits = vec![hit("doc-1", 0, "a"), hit("doc-1", 1, "b")];

        let merged = merger.merge(&hits, 0).await;
        assert_eq!(merged.len(), 2);
        assert_eq!(merged, hits);
    }

    #[tokio::test]
    async fn test_merged_chunk_ids_collected() {
        let source = FixtureSource::new().with_doc("doc-1", vec![(0, "a"), (1, "b")]);
        let merger = merger(source);
        let hits = vec![hit("doc-1", 0, "a")];

        let merged = merger.merge(&hits, 1000).await;
        assert_eq!(
            merged[0].payload.merged_chunk_ids.as_deref(),
            Some(&["doc-1#0".to_string(), "doc-1#1".to_string()][..])
        );
    }
}
