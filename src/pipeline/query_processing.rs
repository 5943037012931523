//! Query pre-processing.
//!
//! Light normalization before retrieval: synonym rewrite, domain entity
//! hints, page-type boost derivation and a shallow " и "-decomposition
//! into sub-queries. All of it is plain string work; failures here mean a
//! degenerate query, not an exceptional state.

use serde::{Deserialize, Serialize};

/// Page-type boost applied when the query reads like a how/what/why
/// question.
const FAQ_BOOST: f64 = 1.2;
/// Maximum sub-queries produced by decomposition.
const MAX_SUBQUERIES: usize = 3;

/// Domain entity dictionary matched against the lowercased query.
const ENTITY_CANDIDATES: &[&str] = &[
    "арм агента",
    "арм супервайзера",
    "арм администратора",
    "api",
    "faq",
    "release notes",
    "чат-боты",
];

/// Question words that mark a FAQ-flavored query.
const FAQ_CUES: &[&str] = &["как", "что", "почему"];

/// Output of query pre-processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedQuery {
    /// Query text after synonym rewriting.
    pub normalized_text: String,
    /// Domain entities recognized in the query.
    pub entities: Vec<String>,
    /// Page-type → factor boosts derived from the query shape.
    pub page_type_boosts: std::collections::HashMap<String, f64>,
    /// Conjunction-split sub-queries (at most three).
    pub subqueries: Vec<String>,
}

/// Pre-processes raw query text.
#[must_use]
pub fn process_query(text: &str) -> ProcessedQuery {
    let normalized_text = rewrite_query(text);
    let entities = extract_entities(&normalized_text);
    let subqueries = decompose(&normalized_text);

    let normalized_lower = normalized_text.to_lowercase();
    let mut page_type_boosts = std::collections::HashMap::new();
    if FAQ_CUES.iter().any(|cue| normalized_lower.contains(cue)) {
        page_type_boosts.insert("faq".to_string(), FAQ_BOOST);
    }

    ProcessedQuery {
        normalized_text,
        entities,
        page_type_boosts,
        subqueries,
    }
}

/// Base synonym/abbreviation rewrite.
fn rewrite_query(text: &str) -> String {
    text.trim().replace("РН", "Release Notes")
}

/// Matches the domain entity dictionary against the query.
fn extract_entities(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let lowered = text.to_lowercase();
    ENTITY_CANDIDATES
        .iter()
        .filter(|candidate| lowered.contains(*candidate))
        .map(ToString::to_string)
        .collect()
}

/// Splits conjunction queries ("X и Y") into sub-queries, capped at three.
fn decompose(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    text.split(" и ")
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .take(MAX_SUBQUERIES)
        .map(ToString::to_string)
        .collect()
}
