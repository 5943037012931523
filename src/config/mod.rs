//! Retrieval configuration with builder pattern and environment variable
//! support.
//!
//! Configuration is resolved in order: explicit values → environment
//! variables → defaults. Everything here is process-scoped and immutable
//! after startup; the pipeline holds it behind an `Arc`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default RRF additive constant.
const DEFAULT_RRF_K: u32 = 60;
/// Default dense/sparse RRF leg weights.
const DEFAULT_LEG_WEIGHT: f64 = 0.5;
/// Default HNSW search-time effort knob.
const DEFAULT_HNSW_EF_SEARCH: u32 = 200;
/// Default candidate count requested from hybrid search.
const DEFAULT_SEARCH_K: usize = 20;
/// Default chunk cache capacity.
const DEFAULT_CACHE_MAXSIZE: usize = 1024;
/// Default chunk cache entry TTL in seconds.
const DEFAULT_CACHE_TTL_SECS: u64 = 600;
/// Default scroll page size for full-document fetch.
const DEFAULT_SCROLL_BATCH_SIZE: u32 = 256;
/// Default auto-merge window budget in tokens.
const DEFAULT_AUTO_MERGE_MAX_TOKENS: u32 = 1200;
/// Default answer-generator context budget in tokens.
const DEFAULT_MAX_CONTEXT_TOKENS: usize = 3000;
/// Default fraction of the context budget reserved for the answer.
const DEFAULT_RESERVE_FOR_RESPONSE: f64 = 0.35;
/// Default reserve fraction for short list-style answers.
const DEFAULT_RESERVE_FOR_LIST_RESPONSE: f64 = 0.25;
/// Default number of documents kept after reranking.
const DEFAULT_RERANK_TOP_N: usize = 6;
/// Default reranker batch size.
const DEFAULT_RERANK_BATCH_SIZE: usize = 20;
/// Default character cap applied to candidate text before reranking.
const DEFAULT_RERANK_MAX_CHARS: usize = 384;
/// Default model-token cap for query embedding.
const DEFAULT_EMBEDDING_MAX_LENGTH_QUERY: usize = 512;

/// Multiplicative boost factors applied by the hybrid searcher.
///
/// All factors must be positive; values below 1.0 demote, above 1.0
/// promote. Defaults mirror the production tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostFactors {
    /// Overview/introduction pages.
    pub overview_docs: f64,
    /// FAQ, guides, manuals.
    pub faq_guides: f64,
    /// Admin/API/SDK/integration pages, long documents, example-rich text.
    pub technical_docs: f64,
    /// Release notes, blogs, changelogs (demoted for general questions).
    pub release_notes: f64,
    /// Documents with headings and list markers.
    pub well_structured: f64,
    /// Documents in the 1000–5000 character sweet spot.
    pub optimal_length: f64,
    /// Documents from the configured reliable-source list.
    pub reliable_source: f64,
}

impl Default for BoostFactors {
    fn default() -> Self {
        Self {
            overview_docs: 1.4,
            faq_guides: 1.2,
            technical_docs: 1.1,
            release_notes: 0.8,
            well_structured: 1.15,
            optimal_length: 1.2,
            reliable_source: 1.1,
        }
    }
}

/// Per-external-call deadlines.
///
/// A timeout is treated as a failure of that call and handled by the same
/// degradation rules as any other component error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Index search deadline.
    pub search: Duration,
    /// Index scroll deadline, per page.
    pub scroll: Duration,
    /// Embedder deadline.
    pub embed: Duration,
    /// Reranker deadline.
    pub rerank: Duration,
    /// Theme-router LLM deadline (short; routing must stay cheap).
    pub llm: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            search: Duration::from_secs(2),
            scroll: Duration::from_secs(5),
            embed: Duration::from_secs(10),
            rerank: Duration::from_secs(15),
            llm: Duration::from_secs(3),
        }
    }
}

/// Configurable list-intent rule for the context optimizer.
///
/// `query_pattern` decides whether a query asks for an enumeration;
/// `heading_pattern` names the Markdown section to extract from the top
/// document. Both are regexes compiled at optimizer construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListIntentRule {
    /// Regex matched against the query text.
    pub query_pattern: String,
    /// Regex matched against Markdown heading lines.
    pub heading_pattern: String,
    /// Character cap for the extracted section.
    pub max_chars: usize,
}

impl Default for ListIntentRule {
    fn default() -> Self {
        Self {
            query_pattern: r"(?is)\b(какие|список|перечень)\b.*\bканал".to_string(),
            heading_pattern: r"(?i)^##\s+Каналы".to_string(),
            max_chars: 8000,
        }
    }
}

/// Configuration for the retrieval core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Index collection name.
    pub collection: String,
    /// Additive constant in the RRF denominator.
    pub rrf_k: u32,
    /// RRF weight for the dense leg.
    pub hybrid_dense_weight: f64,
    /// RRF weight for the sparse leg.
    pub hybrid_sparse_weight: f64,
    /// Enables the sparse search leg.
    pub use_sparse: bool,
    /// Search-time accuracy knob passed to both legs.
    pub hnsw_ef_search: u32,
    /// Candidate count requested from hybrid search.
    pub search_k: usize,
    /// Multiplicative boost factors.
    pub boosts: BoostFactors,
    /// Source labels that earn the reliable-source boost.
    pub reliable_sources: Vec<String>,
    /// Chunk cache capacity (documents).
    pub chunk_cache_maxsize: usize,
    /// Chunk cache per-entry TTL.
    pub chunk_cache_ttl: Duration,
    /// Scroll page size for full-document fetch.
    pub scroll_batch_size: u32,
    /// Enables neighbor auto-merge.
    pub auto_merge_enabled: bool,
    /// Token budget per merged window.
    pub auto_merge_max_tokens: u32,
    /// Prefer an injected exact token estimator over the heuristic.
    pub auto_merge_exact_estimator: bool,
    /// Total context budget for the answer generator.
    pub max_context_tokens: usize,
    /// Fraction of the budget reserved for the generator's own output.
    pub reserve_for_response: f64,
    /// Reserve fraction used by the list-intent fallback path.
    pub reserve_for_list_response: f64,
    /// Documents kept after reranking.
    pub rerank_top_n: usize,
    /// Reranker batch size hint.
    pub rerank_batch_size: usize,
    /// Character cap applied to candidate text before reranking.
    pub rerank_max_chars: usize,
    /// Enables the LLM theme-routing path.
    pub theme_router_use_llm: bool,
    /// Path to the theme catalog (YAML).
    pub themes_config_path: Option<PathBuf>,
    /// Optional pre-filter keeping only the K largest sparse weights.
    pub sparse_top_k: Option<usize>,
    /// Model-token cap for query embedding.
    pub embedding_max_length_query: usize,
    /// Expected dense embedding dimension.
    pub dense_dimensions: usize,
    /// Per-external-call deadlines.
    pub timeouts: Timeouts,
    /// List-intent extraction rule.
    pub list_intent: ListIntentRule,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            collection: "docs_chunks".to_string(),
            rrf_k: DEFAULT_RRF_K,
            hybrid_dense_weight: DEFAULT_LEG_WEIGHT,
            hybrid_sparse_weight: DEFAULT_LEG_WEIGHT,
            use_sparse: true,
            hnsw_ef_search: DEFAULT_HNSW_EF_SEARCH,
            search_k: DEFAULT_SEARCH_K,
            boosts: BoostFactors::default(),
            reliable_sources: vec![
                "docs-site".to_string(),
                "official-docs".to_string(),
                "main-docs".to_string(),
            ],
            chunk_cache_maxsize: DEFAULT_CACHE_MAXSIZE,
            chunk_cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            scroll_batch_size: DEFAULT_SCROLL_BATCH_SIZE,
            auto_merge_enabled: true,
            auto_merge_max_tokens: DEFAULT_AUTO_MERGE_MAX_TOKENS,
            auto_merge_exact_estimator: false,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            reserve_for_response: DEFAULT_RESERVE_FOR_RESPONSE,
            reserve_for_list_response: DEFAULT_RESERVE_FOR_LIST_RESPONSE,
            rerank_top_n: DEFAULT_RERANK_TOP_N,
            rerank_batch_size: DEFAULT_RERANK_BATCH_SIZE,
            rerank_max_chars: DEFAULT_RERANK_MAX_CHARS,
            theme_router_use_llm: false,
            themes_config_path: None,
            sparse_top_k: None,
            embedding_max_length_query: DEFAULT_EMBEDDING_MAX_LENGTH_QUERY,
            dense_dimensions: crate::embedding::DEFAULT_DIMENSIONS,
            timeouts: Timeouts::default(),
            list_intent: ListIntentRule::default(),
        }
    }
}

impl RetrievalConfig {
    /// Creates a configuration with defaults overridden from environment
    /// variables (`RAGCORE_*`).
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse::<u32>("RAGCORE_RRF_K") {
            config.rrf_k = v;
        }
        if let Some(v) = env_parse::<f64>("RAGCORE_HYBRID_DENSE_WEIGHT") {
            config.hybrid_dense_weight = v;
        }
        if let Some(v) = env_parse::<f64>("RAGCORE_HYBRID_SPARSE_WEIGHT") {
            config.hybrid_sparse_weight = v;
        }
        if let Some(v) = env_bool("RAGCORE_USE_SPARSE") {
            config.use_sparse = v;
        }
        if let Some(v) = env_parse::<u32>("RAGCORE_HNSW_EF_SEARCH") {
            config.hnsw_ef_search = v;
        }
        if let Ok(v) = std::env::var("RAGCORE_COLLECTION") {
            config.collection = v;
        }
        if let Some(v) = env_parse::<usize>("RAGCORE_CHUNK_CACHE_MAXSIZE") {
            config.chunk_cache_maxsize = v;
        }
        if let Some(v) = env_parse::<u64>("RAGCORE_CHUNK_CACHE_TTL_SECONDS") {
            config.chunk_cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_bool("RAGCORE_AUTO_MERGE_ENABLED") {
            config.auto_merge_enabled = v;
        }
        if let Some(v) = env_parse::<u32>("RAGCORE_AUTO_MERGE_MAX_TOKENS") {
            config.auto_merge_max_tokens = v;
        }
        if let Some(v) = env_parse::<usize>("RAGCORE_MAX_CONTEXT_TOKENS") {
            config.max_context_tokens = v;
        }
        if let Some(v) = env_parse::<f64>("RAGCORE_RESERVE_FOR_RESPONSE") {
            config.reserve_for_response = v;
        }
        if let Some(v) = env_bool("RAGCORE_THEME_ROUTER_USE_LLM") {
            config.theme_router_use_llm = v;
        }
        if let Ok(v) = std::env::var("RAGCORE_THEMES_CONFIG_PATH") {
            config.themes_config_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_parse::<usize>("RAGCORE_SPARSE_TOP_K") {
            config.sparse_top_k = Some(v);
        }

        config
    }

    /// Validates the configuration, reporting every problem at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing all violations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.rrf_k == 0 {
            errors.push("rrf_k must be positive".to_string());
        }
        if self.hybrid_dense_weight <= 0.0 {
            errors.push("hybrid_dense_weight must be positive".to_string());
        }
        if self.hybrid_sparse_weight <= 0.0 {
            errors.push("hybrid_sparse_weight must be positive".to_string());
        }
        if self.hnsw_ef_search == 0 {
            errors.push("hnsw_ef_search must be positive".to_string());
        }
        for (name, value) in [
            ("boost_overview_docs", self.boosts.overview_docs),
            ("boost_faq_guides", self.boosts.faq_guides),
            ("boost_technical_docs", self.boosts.technical_docs),
            ("boost_release_notes", self.boosts.release_notes),
            ("boost_well_structured", self.boosts.well_structured),
            ("boost_optimal_length", self.boosts.optimal_length),
            ("boost_reliable_source", self.boosts.reliable_source),
        ] {
            if value <= 0.0 {
                errors.push(format!("{name} must be positive"));
            }
        }
        if self.chunk_cache_maxsize == 0 {
            errors.push("chunk_cache_maxsize must be positive".to_string());
        }
        if self.scroll_batch_size == 0 {
            errors.push("scroll_batch_size must be positive".to_string());
        }
        if self.auto_merge_enabled && self.auto_merge_max_tokens == 0 {
            errors.push("auto_merge_max_tokens must be positive when auto-merge is on".to_string());
        }
        if self.max_context_tokens == 0 {
            errors.push("max_context_tokens must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.reserve_for_response) {
            errors.push("reserve_for_response must be in [0, 1)".to_string());
        }
        if !(0.0..1.0).contains(&self.reserve_for_list_response) {
            errors.push("reserve_for_list_response must be in [0, 1)".to_string());
        }
        if self.rerank_top_n == 0 {
            errors.push("rerank_top_n must be positive".to_string());
        }
        if self.rerank_batch_size == 0 {
            errors.push("rerank_batch_size must be positive".to_string());
        }
        if self.embedding_max_length_query == 0 {
            errors.push("embedding_max_length_query must be positive".to_string());
        }
        if self.dense_dimensions == 0 {
            errors.push("dense_dimensions must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors.join("; ")))
        }
    }

    /// Non-fatal warnings surfaced to the operator at validation time.
    #[must_use]
    pub fn validation_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        // Ranking reads canonical_url first and falls back to url; indexes
        // that populate only one of the two behave consistently, mixed
        // corpora may rank near-duplicate pages differently.
        warnings.push(
            "payloads may carry both `url` and `canonical_url`; ranking prefers \
             `canonical_url` and falls back to `url`"
                .to_string(),
        );

        if self.theme_router_use_llm && self.themes_config_path.is_none() {
            warnings.push(
                "theme_router_use_llm is on but themes_config_path is unset; \
                 routing will always fall back to heuristics over an empty catalog"
                    .to_string(),
            );
        }
        if !self.use_sparse {
            warnings.push("use_sparse is off; retrieval runs dense-only".to_string());
        }

        warnings
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
}
