//! Context shaping for the answer generator.
//!
//! Takes the reranked (and possibly merged) hits and trims them to fit the
//! generator's token budget: complexity-adaptive document counts, per
//! document budgets, and Markdown-block truncation that never cuts through
//! a list or a fenced code block. A strict "list intent" pattern switches
//! to section-extraction mode instead.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::RetrievalConfig;
use crate::core::Hit;
use crate::error::ConfigError;

/// Characters per token for optimizer-side estimates (tuned for Russian).
const CHARS_PER_TOKEN_ESTIMATE: f64 = 3.5;
/// Characters per token when converting a token budget to characters.
const CHARS_PER_TOKEN_BUDGET: usize = 4;
/// Token cap for the top two documents.
const TOP_DOC_TOKEN_CAP: usize = 600;
/// Token cap for the remaining documents.
const TAIL_DOC_TOKEN_CAP: usize = 400;
/// Budget multiplier for the top two documents.
const TOP_DOC_MULTIPLIER: f64 = 1.5;

/// Lexical cues marking simple lookup questions (fewer documents needed).
const SIMPLE_CUES: &[&str] = &[
    "что такое",
    "как называется",
    "где находится",
    "когда",
    "какие",
    "список",
    "перечисли",
    "перечень",
    "what is",
    "which",
    "list of",
];
/// Lexical cues marking complex how-to questions (more documents needed).
const COMPLEX_CUES: &[&str] = &[
    "как настроить",
    "пошаговая инструкция",
    "подробно",
    "примеры",
    "how to configure",
    "step by step",
    "in detail",
    "examples",
];

/// Query complexity classes driving the target document count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryComplexity {
    /// Lookup-style question; two documents suffice.
    Simple,
    /// Everything else.
    Medium,
    /// Multi-step configuration question; needs broad context.
    Complex,
}

impl QueryComplexity {
    /// Classifies a query from lexical cues. Simple cues win over complex
    /// ones because list-style questions often contain both.
    #[must_use]
    pub fn classify(query: &str) -> Self {
        let query_lower = query.to_lowercase();
        if SIMPLE_CUES.iter().any(|cue| query_lower.contains(cue)) {
            return Self::Simple;
        }
        if COMPLEX_CUES.iter().any(|cue| query_lower.contains(cue)) {
            return Self::Complex;
        }
        Self::Medium
    }

    /// Target document count for this complexity, bounded by availability.
    #[must_use]
    pub fn target_documents(self, available: usize) -> usize {
        match self {
            Self::Simple => available.min(2),
            Self::Complex => available.min(7),
            Self::Medium => available.min(6),
        }
    }
}

/// Shapes the final hit list under the generator token budget.
///
/// Pure: never mutates input hits, returns shaped clones.
pub struct ContextOptimizer {
    config: Arc<RetrievalConfig>,
    list_intent_query: Regex,
    list_intent_heading: Regex,
    heading_level: Regex,
}

impl ContextOptimizer {
    /// Creates an optimizer, compiling the configured list-intent rule.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Regex`] when a configured pattern does not
    /// compile.
    pub fn new(config: Arc<RetrievalConfig>) -> Result<Self, ConfigError> {
        let list_intent_query = Regex::new(&config.list_intent.query_pattern)?;
        let list_intent_heading = Regex::new(&config.list_intent.heading_pattern)?;
        let heading_level = Regex::new(r"^(#{1,6})\s+")?;
        Ok(Self {
            config,
            list_intent_query,
            list_intent_heading,
            heading_level,
        })
    }

    /// Produces a shorter hit list fitting the generator budget.
    ///
    /// Non-empty input always yields non-empty output.
    #[must_use]
    pub fn optimize(&self, query: &str, hits: &[Hit]) -> Vec<Hit> {
        if hits.is_empty() {
            return Vec::new();
        }

        if self.is_list_intent(query) {
            info!("list intent detected, using extract mode");
            return self.handle_list_intent(hits);
        }

        let available = self.available_tokens(self.config.reserve_for_response);
        let complexity = QueryComplexity::classify(query);
        let target = complexity.target_documents(hits.len());
        debug!(available, ?complexity, target, "context optimization plan");

        let per_doc = available / target.max(1);
        let mut shaped = Vec::with_capacity(target);

        for (position, hit) in hits.iter().take(target).enumerate() {
            let budget = doc_token_budget(position, per_doc);
            let mut shaped_hit = hit.clone();
            let original_text = shaped_hit.payload.text.clone();
            let optimized = self.shape_text(&original_text, budget);

            shaped_hit.payload.original_length = Some(char_len(&original_text));
            shaped_hit.payload.optimized_length = Some(char_len(&optimized));
            shaped_hit.payload.text = optimized;
            shaped.push(shaped_hit);
        }

        shaped
    }

    /// Whether the configured list-intent rule matches the query.
    #[must_use]
    pub fn is_list_intent(&self, query: &str) -> bool {
        !query.is_empty() && self.list_intent_query.is_match(query)
    }

    /// Tokens left for documents after the response reserve.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn available_tokens(&self, reserve: f64) -> usize {
        ((self.config.max_context_tokens as f64) * (1.0 - reserve)).floor() as usize
    }

    /// Extract mode for enumeration questions: keep only the top hit and
    /// pull the matching Markdown section out of it, falling back to
    /// block-wise truncation of the whole document.
    fn handle_list_intent(&self, hits: &[Hit]) -> Vec<Hit> {
        let top = &hits[0];
        let original_text = top.payload.text.clone();

        let mut extracted = self.extract_markdown_section(
            &original_text,
            self.config.list_intent.max_chars,
        );
        if extracted.trim().is_empty() {
            info!("list section not found, falling back to block truncation");
            let max_chars = self
                .available_tokens(self.config.reserve_for_list_response)
                .saturating_mul(CHARS_PER_TOKEN_BUDGET);
            extracted = truncate_by_blocks(&original_text, max_chars);
        }

        let mut shaped = top.clone();
        shaped.payload.original_length = Some(char_len(&original_text));
        shaped.payload.optimized_length = Some(char_len(&extracted));
        shaped.payload.text = extracted;
        shaped.payload.list_mode = true;
        vec![shaped]
    }

    /// Trims text to a token budget, preserving Markdown structure. Text
    /// already within budget passes through unchanged.
    fn shape_text(&self, text: &str, max_tokens: usize) -> String {
        if text.is_empty() {
            return String::new();
        }
        if estimate_tokens(text) <= max_tokens {
            return text.to_string();
        }
        let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN_BUDGET);
        truncate_by_blocks(text, max_chars)
    }

    /// Extracts the Markdown section whose heading matches the configured
    /// pattern, stopping at the next heading of the same or higher level,
    /// bounded by `max_chars`. Empty when no heading matches.
    fn extract_markdown_section(&self, text: &str, max_chars: usize) -> String {
        if text.is_empty() {
            return String::new();
        }

        let lines: Vec<&str> = text.lines().collect();
        let mut start_idx = None;
        let mut heading_level = 2usize;

        for (i, line) in lines.iter().enumerate() {
            let stripped = line.trim();
            if stripped.is_empty() {
                continue;
            }
            if self.list_intent_heading.is_match(stripped) {
                heading_level = self
                    .heading_level
                    .captures(stripped)
                    .and_then(|c| c.get(1))
                    .map_or(2, |m| m.as_str().len());
                start_idx = Some(i);
                break;
            }
        }

        let Some(start_idx) = start_idx else {
            return String::new();
        };

        let mut collected: Vec<&str> = Vec::new();
        let mut current_length = 0usize;

        for &line in &lines[start_idx..] {
            let stripped = line.trim();
            if !collected.is_empty()
                && let Some(captures) = self.heading_level.captures(stripped)
                && captures.get(1).is_some_and(|m| m.as_str().len() <= heading_level)
            {
                break;
            }

            let line_chars = char_len(line);
            if current_length + line_chars + 1 > max_chars {
                break;
            }
            collected.push(line);
            current_length += line_chars + 1;
        }

        collected.join("\n").trim().to_string()
    }
}

/// Token budget for the document at `position` given the per-document
/// share. The first two documents get a larger, capped slice.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn doc_token_budget(position: usize, per_doc: usize) -> usize {
    if position < 2 {
        (((per_doc as f64) * TOP_DOC_MULTIPLIER) as usize).min(TOP_DOC_TOKEN_CAP)
    } else {
        per_doc.min(TAIL_DOC_TOKEN_CAP)
    }
}

/// Optimizer-side token estimate (~3.5 chars/token for Russian text).
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    ((char_len(text) as f64) / CHARS_PER_TOKEN_ESTIMATE) as usize
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits text into Markdown blocks separated by blank lines. Fenced code
/// blocks are kept atomic.
fn split_markdown_blocks(text: &str) -> Vec<String> {
    let mut blocks: Vec<String> = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    let mut in_code_block = false;

    let flush = |buffer: &mut Vec<&str>, blocks: &mut Vec<String>| {
        if !buffer.is_empty() {
            let block = buffer.join("\n").trim_matches('\n').to_string();
            if !block.trim().is_empty() {
                blocks.push(block);
            }
            buffer.clear();
        }
    };

    for line in text.lines() {
        let stripped = line.trim();

        if stripped.starts_with("```") {
            if in_code_block {
                buffer.push(line);
                flush(&mut buffer, &mut blocks);
                in_code_block = false;
            } else {
                flush(&mut buffer, &mut blocks);
                in_code_block = true;
                buffer.push(line);
            }
            continue;
        }

        if in_code_block {
            buffer.push(line);
            continue;
        }

        if stripped.is_empty() {
            flush(&mut buffer, &mut blocks);
            continue;
        }

        buffer.push(line);
    }
    flush(&mut buffer, &mut blocks);

    blocks
}

/// Truncates one block to `max_chars`. Code blocks get their closing fence
/// re-appended; prose blocks are cut line-wise, falling back to a grapheme
/// prefix of the first line.
fn truncate_block(block: &str, max_chars: usize) -> String {
    if char_len(block) <= max_chars {
        return block.to_string();
    }

    if block.trim_start().starts_with("```") {
        let budget = max_chars.saturating_sub(4);
        let truncated: String = grapheme_prefix(block, budget).trim_end().to_string();
        if truncated.ends_with("```") {
            truncated
        } else {
            format!("{truncated}\n```")
        }
    } else {
        let mut acc: Vec<&str> = Vec::new();
        let mut current = 0usize;
        for line in block.lines() {
            let line_chars = char_len(line);
            if current + line_chars <= max_chars {
                acc.push(line);
                current += line_chars + 1;
            } else {
                if acc.is_empty() {
                    return grapheme_prefix(line, max_chars).trim().to_string();
                }
                break;
            }
        }
        acc.join("\n").trim().to_string()
    }
}

/// Assembles blocks until the next one would exceed `max_chars`, then
/// appends a partial prefix of the first block that does not fit.
fn truncate_by_blocks(text: &str, max_chars: usize) -> String {
    if text.is_empty() {
        return String::new();
    }

    let blocks = split_markdown_blocks(text);
    if blocks.is_empty() {
        return grapheme_prefix(text, max_chars).to_string();
    }

    let mut assembled = String::new();
    for block in blocks {
        let separator_chars = if assembled.is_empty() { 0 } else { 2 };
        let assembled_chars = char_len(&assembled);

        if assembled_chars + separator_chars + char_len(&block) <= max_chars {
            if !assembled.is_empty() {
                assembled.push_str("\n\n");
            }
            assembled.push_str(&block);
            continue;
        }

        let remaining = max_chars.saturating_sub(assembled_chars + separator_chars);
        if remaining > 0 {
            let truncated = truncate_block(&block, remaining);
            if !truncated.is_empty() {
                if !assembled.is_empty() {
                    assembled.push_str("\n\n");
                }
                assembled.push_str(&truncated);
            }
        }
        break;
    }

    assembled.trim().to_string()
}

/// First `max_graphemes` grapheme clusters of `s`, never splitting a
/// character.
fn grapheme_prefix(s: &str, max_graphemes: usize) -> &str {
    match s.grapheme_indices(true).nth(max_graphemes) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}
