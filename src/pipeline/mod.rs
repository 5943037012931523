//! End-to-end retrieval orchestration.
//!
//! Wires the stages into one request path: query pre-processing → theme
//! routing → embedding → hybrid search (with filter fallback) → additive
//! theme boost → rerank → neighbor auto-merge → context shaping → theme
//! labels. Recoverable failures degrade inline; only the terminal
//! [`RetrievalError`] outcomes cross this boundary, and cancellation is
//! honored at every suspension point.

mod query_processing;

pub use query_processing::{ProcessedQuery, process_query};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ChunkCache;
use crate::config::RetrievalConfig;
use crate::context::ContextOptimizer;
use crate::core::{Hit, Query};
use crate::embedding::{EmbedKind, Embedder, QueryEmbedding};
use crate::error::{ConfigError, RetrievalError};
use crate::index::{MetadataFilter, VectorIndex};
use crate::llm::LlmProvider;
use crate::merge::{AutoMerger, ChunkSource};
use crate::rerank::Reranker;
use crate::search::{BoostContext, HybridSearcher};
use crate::theme::{RoutingResult, ThemeCatalog, ThemeRouter};
use crate::tokenizer::{HeuristicEstimator, TokenEstimator};

/// Additive boost for chunks matching the primary routed theme.
const PRIMARY_THEME_BOOST: f64 = 0.08;
/// Additive boost for chunks matching a secondary routed theme.
const SECONDARY_THEME_BOOST: f64 = 0.04;

/// Shared process-scoped collaborators injected into the pipeline.
///
/// Every client here is expected to be thread-safe; one instance serves
/// all in-flight requests.
pub struct CoreContext {
    /// Vector index client.
    pub index: Arc<dyn VectorIndex>,
    /// Embedding backend.
    pub embedder: Arc<dyn Embedder>,
    /// Optional cross-encoder reranker; absence degrades to fused order.
    pub reranker: Option<Arc<dyn Reranker>>,
    /// LLM providers for theme routing, tried in order.
    pub llm_providers: Vec<Arc<dyn LlmProvider>>,
    /// Optional exact token estimator for auto-merge budgeting.
    pub token_estimator: Option<Arc<dyn TokenEstimator>>,
    /// Immutable configuration.
    pub config: Arc<RetrievalConfig>,
    /// Immutable theme catalog.
    pub themes: Arc<ThemeCatalog>,
}

/// Successful retrieval output: shaped chunks plus routing metadata.
#[derive(Debug, Clone)]
pub struct RetrievalResponse {
    /// Final chunk list, shaped for the answer generator.
    pub chunks: Vec<Hit>,
    /// Theme routing outcome for this query.
    pub routing: RoutingResult,
    /// Optional instruction asking the generator to structure the answer
    /// by theme, present when at least two themes are plausible.
    pub theme_instruction: Option<String>,
    /// Query text after normalization.
    pub normalized_query: String,
    /// Domain entities recognized in the query.
    pub entities: Vec<String>,
}

/// The retrieval pipeline.
///
/// Owns no per-request state; the only shared mutable structure behind it
/// is the chunk cache.
pub struct RetrievalPipeline {
    config: Arc<RetrievalConfig>,
    router: ThemeRouter,
    searcher: HybridSearcher,
    cache: Arc<ChunkCache>,
    merger: AutoMerger,
    optimizer: ContextOptimizer,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    themes: Arc<ThemeCatalog>,
}

impl RetrievalPipeline {
    /// Builds the pipeline from shared collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration fails validation or
    /// a configured regex does not compile.
    pub fn new(ctx: CoreContext) -> Result<Self, ConfigError> {
        ctx.config.validate()?;

        let router = if ctx.config.theme_router_use_llm {
            ThemeRouter::new(Arc::clone(&ctx.themes))
                .with_llm(ctx.llm_providers.clone(), ctx.config.timeouts.llm)
        } else {
            ThemeRouter::new(Arc::clone(&ctx.themes))
        };

        let searcher = HybridSearcher::new(Arc::clone(&ctx.index), Arc::clone(&ctx.config));

        let cache = Arc::new(ChunkCache::new(
            Arc::clone(&ctx.index),
            ctx.config.collection.clone(),
            ctx.config.chunk_cache_maxsize,
            ctx.config.chunk_cache_ttl,
            ctx.config.scroll_batch_size,
            ctx.config.timeouts.scroll,
        ));

        let estimator: Arc<dyn TokenEstimator> =
            match (ctx.config.auto_merge_exact_estimator, ctx.token_estimator) {
                (true, Some(exact)) => exact,
                _ => Arc::new(HeuristicEstimator),
            };
        let merger = AutoMerger::new(Arc::clone(&cache) as Arc<dyn ChunkSource>, estimator);

        let optimizer = ContextOptimizer::new(Arc::clone(&ctx.config))?;

        Ok(Self {
            config: ctx.config,
            router,
            searcher,
            cache,
            merger,
            optimizer,
            embedder: ctx.embedder,
            reranker: ctx.reranker,
            themes: ctx.themes,
        })
    }

    /// The chunk cache backing auto-merge (operator hook: `clear()`,
    /// `stats()`).
    #[must_use]
    pub fn chunk_cache(&self) -> &ChunkCache {
        &self.cache
    }

    /// Runs one retrieval request to completion.
    ///
    /// # Errors
    ///
    /// Returns one of the terminal [`RetrievalError`] outcomes; recoverable
    /// component failures degrade inside the pipeline.
    pub async fn retrieve(&self, query: &Query) -> Result<RetrievalResponse, RetrievalError> {
        self.retrieve_cancellable(query, &CancellationToken::new())
            .await
    }

    /// Runs one retrieval request, aborting at the next suspension point
    /// once `cancel` fires.
    ///
    /// Partial work is discarded; the chunk cache only grows through
    /// completed fetches, so a cancelled request leaves no inconsistent
    /// state behind.
    ///
    /// # Errors
    ///
    /// Returns one of the terminal [`RetrievalError`] outcomes, including
    /// [`RetrievalError::Cancelled`].
    pub async fn retrieve_cancellable(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<RetrievalResponse, RetrievalError> {
        // 1. Query pre-processing.
        let processed = process_query(&query.text);
        if processed.normalized_text.is_empty() {
            return Err(RetrievalError::QueryProcessingFailed(
                "query is empty after normalization".to_string(),
            ));
        }
        let normalized = Query {
            text: processed.normalized_text.clone(),
            metadata: query.metadata.clone(),
        };

        // 2. Theme routing (may suspend on the LLM path).
        let routing = guarded(cancel, self.router.route(&normalized)).await?;
        info!(
            primary = routing.primary_theme.as_deref().unwrap_or("-"),
            router = ?routing.router,
            disambiguation = routing.requires_disambiguation,
            "theme routing complete"
        );
        let theme_filter = self.build_theme_filter(&routing);

        // 3. Query embeddings.
        let embedding = self.embed_query(&processed.normalized_text, cancel).await?;

        // 4. Hybrid search, with one unfiltered retry when the filter
        // starved the result set.
        let ctx = BoostContext::new(processed.page_type_boosts.clone(), Vec::new());
        let mut candidates = self
            .run_search(&embedding, &ctx, theme_filter.as_ref(), cancel)
            .await?;
        if candidates.is_empty() && theme_filter.is_some() {
            warn!("no candidates under theme filter, retrying unfiltered");
            candidates = self.run_search(&embedding, &ctx, None, cancel).await?;
        }
        if candidates.is_empty() {
            return Err(RetrievalError::NoResults);
        }

        // 5. Additive theme boost and re-sort.
        apply_theme_boost(&mut candidates, &routing, &self.themes);

        // 6. Rerank (recoverable: degraded to fused order).
        let top = guarded(cancel, self.rerank(&processed.normalized_text, candidates)).await?;

        // 7. Neighbor auto-merge under the remaining context budget.
        let merged = if self.config.auto_merge_enabled {
            let merge_limit = self.merge_budget();
            guarded(cancel, self.merger.merge(&top, merge_limit)).await?
        } else {
            top
        };

        // 8. Context shaping.
        let mut shaped = self.optimizer.optimize(&processed.normalized_text, &merged);

        // 9. Theme labels for delivery surfaces.
        self.attach_theme_labels(&mut shaped);

        let theme_instruction = self.build_theme_instruction(&routing);

        Ok(RetrievalResponse {
            chunks: shaped,
            routing,
            theme_instruction,
            normalized_query: processed.normalized_text,
            entities: processed.entities,
        })
    }

    async fn embed_query(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryEmbedding, RetrievalError> {
        let timeout = self.config.timeouts.embed;
        let embed_call = tokio::time::timeout(
            timeout,
            self.embedder
                .embed(text, self.config.embedding_max_length_query, EmbedKind::Query),
        );

        let mut embedding = match guarded(cancel, embed_call).await? {
            Ok(Ok(embedding)) => embedding,
            Ok(Err(e)) => {
                return Err(RetrievalError::EmbeddingUnavailable(e.to_string()));
            }
            Err(_) => {
                return Err(RetrievalError::EmbeddingUnavailable(format!(
                    "embedder timed out after {}s",
                    timeout.as_secs()
                )));
            }
        };

        if embedding.dense.len() != self.config.dense_dimensions {
            return Err(RetrievalError::EmbeddingUnavailable(format!(
                "dense dimension mismatch: expected {}, got {}",
                self.config.dense_dimensions,
                embedding.dense.len()
            )));
        }
        if let Some(top_k) = self.config.sparse_top_k {
            embedding.sparse = embedding.sparse.pruned_to_top_k(top_k);
        }
        Ok(embedding)
    }

    async fn run_search(
        &self,
        embedding: &QueryEmbedding,
        ctx: &BoostContext,
        filter: Option<&MetadataFilter>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Hit>, RetrievalError> {
        let search = self.searcher.search(
            &embedding.dense,
            &embedding.sparse,
            self.config.search_k,
            ctx,
            filter,
        );
        guarded(cancel, search)
            .await?
            .map_err(|e| RetrievalError::SearchFailed(e.to_string()))
    }

    /// Scores candidates with the cross-encoder and keeps the top N.
    /// Any reranker problem keeps the first N of the fused order instead.
    async fn rerank(&self, query: &str, candidates: Vec<Hit>) -> Vec<Hit> {
        let top_n = self.config.rerank_top_n;
        let Some(reranker) = self.reranker.as_ref() else {
            return take_first(candidates, top_n);
        };
        if candidates.is_empty() {
            return candidates;
        }

        let documents: Vec<String> = candidates
            .iter()
            .map(|hit| {
                let text = if hit.payload.text.is_empty() {
                    hit.payload.title.as_deref().unwrap_or("")
                } else {
                    hit.payload.text.as_str()
                };
                truncate_chars(text, self.config.rerank_max_chars)
            })
            .collect();

        let timeout = self.config.timeouts.rerank;
        let scores = match tokio::time::timeout(
            timeout,
            reranker.score(query, &documents, self.config.rerank_batch_size),
        )
        .await
        {
            Ok(Ok(scores)) if scores.len() == candidates.len() => scores,
            Ok(Ok(scores)) => {
                warn!(
                    expected = candidates.len(),
                    actual = scores.len(),
                    "reranker returned wrong score count, keeping fused order"
                );
                return take_first(candidates, top_n);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "reranking failed, keeping fused order");
                return take_first(candidates, top_n);
            }
            Err(_) => {
                warn!(seconds = timeout.as_secs(), "reranker timed out, keeping fused order");
                return take_first(candidates, top_n);
            }
        };

        let mut scored: Vec<(f32, Hit)> = scores.into_iter().zip(candidates).collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(top_n).map(|(_, hit)| hit).collect()
    }

    /// Window budget for auto-merge: the configured cap, bounded by what
    /// the context optimizer will accept downstream.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn merge_budget(&self) -> u32 {
        let available = ((self.config.max_context_tokens as f64)
            * (1.0 - self.config.reserve_for_response))
            .floor()
            .max(1.0) as u32;
        self.config.auto_merge_max_tokens.min(available)
    }

    /// Builds the search-time metadata filter from a confident routing
    /// result; `None` when routing is not confident enough or the theme
    /// carries no facets.
    fn build_theme_filter(&self, routing: &RoutingResult) -> Option<MetadataFilter> {
        if !routing.filter_eligible() {
            return None;
        }
        let theme = self.themes.get(routing.primary_theme.as_deref()?)?;

        let mut filter = MetadataFilter::new();
        if let Some(domain) = &theme.domain {
            filter = filter.with("domain", domain);
        }
        if let Some(section) = &theme.section {
            filter = filter.with("section", section);
        }
        if let Some(platform) = &theme.platform {
            filter = filter.with("platform", platform);
        }
        if let Some(role) = &theme.role {
            filter = filter.with("role", role);
        }

        if filter.is_empty() {
            None
        } else {
            debug!(conditions = filter.conditions.len(), "theme filter built");
            Some(filter)
        }
    }

    /// Attaches display-name theme labels to output payloads, leaving
    /// already-labeled hits alone.
    fn attach_theme_labels(&self, hits: &mut [Hit]) {
        for hit in hits {
            if hit.payload.theme_label.is_some() {
                continue;
            }
            if let Some(theme) = self.themes.infer_theme(&hit.payload) {
                hit.payload.theme_label = Some(theme.display_name.clone());
            }
        }
    }

    /// Multi-theme answer instruction, emitted when the top two routed
    /// themes both resolve to known display names.
    fn build_theme_instruction(&self, routing: &RoutingResult) -> Option<String> {
        let names: Vec<&str> = routing
            .themes
            .iter()
            .take(2)
            .filter_map(|id| self.themes.get(id))
            .map(|theme| theme.display_name.as_str())
            .collect();
        if names.len() < 2 {
            return None;
        }
        Some(format!(
            "Если ответ затрагивает несколько тематик, сформируй отдельные разделы \
             соответственно: {}.",
            names.join(", ")
        ))
    }
}

/// Applies the additive theme boost on top of the multiplicative pass and
/// re-sorts by the resulting score.
///
/// Two-phase by design: the multiplicative table runs inside the searcher,
/// the +0.08/+0.04 theme nudges land here.
fn apply_theme_boost(hits: &mut [Hit], routing: &RoutingResult, themes: &ThemeCatalog) {
    let Some(primary) = routing.primary_theme.as_deref() else {
        return;
    };
    let secondary = routing.secondary_themes();

    for hit in hits.iter_mut() {
        let Some(theme) = themes.infer_theme(&hit.payload) else {
            continue;
        };
        let base = hit.ranking_score();
        if theme.theme_id == primary {
            hit.boosted_score = Some(base + PRIMARY_THEME_BOOST);
        } else if secondary.iter().any(|id| id == &theme.theme_id) {
            hit.boosted_score = Some(base + SECONDARY_THEME_BOOST);
        } else if hit.boosted_score.is_none() {
            hit.boosted_score = Some(base);
        }
    }

    hits.sort_by(|a, b| {
        b.ranking_score()
            .partial_cmp(&a.ranking_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Races a future against cancellation.
async fn guarded<F, T>(cancel: &CancellationToken, fut: F) -> Result<T, RetrievalError>
where
    F: std::future::Future<Output = T>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RetrievalError::Cancelled),
        out = fut => Ok(out),
    }
}

fn take_first(mut hits: Vec<Hit>, n: usize) -> Vec<Hit> {
    hits.truncate(n);
    hits
}

/// Character-safe prefix truncation for reranker input.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
