//! # ragcore-rs
//!
//! Hybrid retrieval core for documentation QA.
//!
//! Given a user query, the pipeline returns a small ranked list of document
//! fragments optimized for answer generation: dense + sparse retrieval
//! fused with Reciprocal Rank Fusion, metadata- and theme-driven boosting,
//! neighbor auto-merge into token-bounded windows and context shaping
//! under the generator budget.
//!
//! ## Features
//!
//! - **Hybrid search**: concurrent dense/sparse legs with weighted RRF
//! - **Theme routing**: keyword heuristics with an optional LLM path
//! - **Auto-merge**: contiguous neighbor windows under a token budget
//! - **Context shaping**: Markdown-aware truncation and list-intent
//!   section extraction
//!
//! Crawling, indexing, embedding model execution and answer generation
//! stay outside the crate, consumed through the [`index::VectorIndex`],
//! [`embedding::Embedder`], [`rerank::Reranker`] and [`llm::LlmProvider`]
//! traits.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod core;
pub mod embedding;
pub mod error;
pub mod index;
pub mod llm;
pub mod merge;
pub mod pipeline;
pub mod rerank;
pub mod search;
pub mod theme;
pub mod tokenizer;

// Re-export commonly used types at crate root
pub use error::{Error, Result, RetrievalError};

// Re-export core domain types
pub use core::{ChunkPayload, ChunkSpan, DenseVector, Hit, Query, SparseVector, UserMetadata};

// Re-export configuration
pub use config::{BoostFactors, ListIntentRule, RetrievalConfig, Timeouts};

// Re-export external interface traits
pub use embedding::{EmbedKind, Embedder, QueryEmbedding};
pub use index::{IndexHit, MetadataFilter, QueryVector, ScrollPage, VectorIndex};
pub use llm::{CompletionRequest, LlmProvider};
pub use rerank::Reranker;

// Re-export pipeline components
pub use cache::{ChunkCache, DocChunk, DocChunkSequence};
pub use context::{ContextOptimizer, QueryComplexity};
pub use merge::AutoMerger;
pub use pipeline::{CoreContext, RetrievalPipeline, RetrievalResponse};
pub use search::{BoostContext, FusionConfig, HybridSearcher};
pub use theme::{RouterKind, RoutingResult, Theme, ThemeCatalog, ThemeRouter};
pub use tokenizer::{HeuristicEstimator, TokenEstimator};

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};
