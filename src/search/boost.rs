//! Deterministic ranking boosts.
//!
//! All boosts here are multiplicative with positive factors and applied in
//! a fixed order, so `boosted_score = rrf_score * product(factors)` and the
//! result is independent of payload field arrival order. The additive theme
//! boost is a separate second phase owned by the pipeline.

use std::collections::HashMap;

use crate::config::BoostFactors;
use crate::core::Hit;

/// Deep-path demotion factor for URLs nested more than four segments.
const DEEP_PATH_PENALTY: f64 = 0.95;
/// Segment count above which the deep-path penalty applies.
const DEEP_PATH_SEGMENTS: usize = 4;
/// Content-length band receiving the optimal-length boost.
const OPTIMAL_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 1000..=5000;

/// URL substrings marking overview documentation.
const OVERVIEW_PATHS: &[&str] = &["/start/", "/overview", "/introduction", "/what-is", "/about"];
/// URL substrings marking FAQ and guide pages.
const FAQ_PATHS: &[&str] = &["/faq", "/guide", "/manual", "/help"];
/// URL substrings marking technical documentation.
const TECHNICAL_PATHS: &[&str] = &["/admin/", "/api/", "/sdk/", "/integration"];
/// URL substrings marking release notes and blogs.
const RELEASE_PATHS: &[&str] = &["/blog", "/release", "/version", "/changelog"];

/// Title cues for overview pages.
const OVERVIEW_TITLES: &[&str] = &[
    "что такое",
    "обзор",
    "введение",
    "начало работы",
    "возможности",
    "overview",
    "intro",
];
/// Title cues for configuration/setup pages.
const TECHNICAL_TITLES: &[&str] = &["настройка", "конфигурация", "установка", "config"];

/// Text markers indicating headings or list structure.
const STRUCTURE_MARKERS: &[&str] = &["##", "###", "•", "1.", "2.", "3.", "- "];
/// Text markers indicating worked examples or step-by-step content.
const EXAMPLE_MARKERS: &[&str] = &["пример", "example", "шаг", "step"];

/// Per-request boost hints derived from query pre-processing.
#[derive(Debug, Clone, Default)]
pub struct BoostContext {
    /// Page-type → factor map (e.g. `faq → 1.2` for how/what/why queries).
    pub page_type_boosts: HashMap<String, f64>,
    /// Normalized group-key → factor pairs, in insertion order; the first
    /// key matching a chunk's `groups_path` entry wins.
    pub group_boosts: Vec<(String, f64)>,
}

impl BoostContext {
    /// Builds a context, normalizing group keys (lowercased, trimmed) and
    /// dropping non-positive factors.
    #[must_use]
    pub fn new(
        page_type_boosts: HashMap<String, f64>,
        group_boosts: impl IntoIterator<Item = (String, f64)>,
    ) -> Self {
        let group_boosts = group_boosts
            .into_iter()
            .filter(|(_, factor)| *factor > 0.0)
            .map(|(key, factor)| (key.to_lowercase().trim().to_string(), factor))
            .collect();
        Self {
            page_type_boosts,
            group_boosts,
        }
    }
}

/// Applies the multiplicative boost table to one fused hit.
///
/// Reads `rrf_score` (falling back to the raw index score) and fills
/// `boosted_score`. Application order is fixed for determinism: page type,
/// groups, URL shape, title, length bucket, structure, source reliability,
/// deep-path penalty.
pub fn apply_boosts(
    hit: &mut Hit,
    ctx: &BoostContext,
    factors: &BoostFactors,
    reliable_sources: &[String],
) {
    let mut score = hit.rrf_score.unwrap_or(f64::from(hit.score));
    let payload = &hit.payload;

    // 1. Page-type boost from query pre-processing.
    if let Some(page_type) = payload.page_type.as_deref()
        && let Some(factor) = ctx.page_type_boosts.get(&page_type.to_lowercase())
    {
        score *= factor;
    }

    // 2. Group boost: first matching normalized group key wins.
    if !ctx.group_boosts.is_empty() {
        'groups: for group in &payload.groups_path {
            let normalized_group = group.to_lowercase();
            let normalized_group = normalized_group.trim();
            for (key, factor) in &ctx.group_boosts {
                if !key.is_empty() && normalized_group.contains(key.as_str()) {
                    score *= factor;
                    break 'groups;
                }
            }
        }
    }

    let url = payload.effective_url().unwrap_or("").to_lowercase();
    let title = payload
        .title
        .as_deref()
        .unwrap_or("")
        .to_lowercase();

    // 3. Document type from URL structure; first class matched wins.
    if OVERVIEW_PATHS.iter().any(|p| url.contains(p)) {
        score *= factors.overview_docs;
    } else if FAQ_PATHS.iter().any(|p| url.contains(p)) {
        score *= factors.faq_guides;
    } else if TECHNICAL_PATHS.iter().any(|p| url.contains(p)) {
        score *= factors.technical_docs;
    } else if RELEASE_PATHS.iter().any(|p| url.contains(p)) {
        score *= factors.release_notes;
    }

    // 4. Title cues.
    if OVERVIEW_TITLES.iter().any(|k| title.contains(k)) {
        score *= factors.overview_docs;
    } else if TECHNICAL_TITLES.iter().any(|k| title.contains(k)) {
        score *= factors.technical_docs;
    }

    // 5. Content-length bucket.
    let content_length = payload.effective_content_length();
    if OPTIMAL_LENGTH_RANGE.contains(&content_length) {
        score *= factors.optimal_length;
    } else if content_length > *OPTIMAL_LENGTH_RANGE.end() {
        score *= factors.technical_docs;
    }

    // 6. Structure signals in the text.
    if !payload.text.is_empty() {
        let text_lower = payload.text.to_lowercase();
        if STRUCTURE_MARKERS.iter().any(|m| text_lower.contains(m)) {
            score *= factors.well_structured;
        }
        if EXAMPLE_MARKERS.iter().any(|m| text_lower.contains(m)) {
            score *= factors.technical_docs;
        }
    }

    // 7. Source reliability.
    if let Some(source) = payload.source.as_deref()
        && reliable_sources
            .iter()
            .any(|s| s.eq_ignore_ascii_case(source))
    {
        score *= factors.reliable_source;
    }

    // 8. Deep-path demotion to damp near-duplicate nested pages.
    if path_segment_count(&url) > DEEP_PATH_SEGMENTS {
        score *= DEEP_PATH_PENALTY;
    }

    hit.boosted_score = Some(score);
}

/// Counts non-empty path segments, ignoring scheme and host.
fn path_segment_count(url: &str) -> usize {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme.split_once('/').map_or("", |(_, p)| p);
    path.split('/').filter(|s| !s.is_empty()).count()
}
