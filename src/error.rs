//! Error types for the retrieval core.
//!
//! This module provides a comprehensive error hierarchy using `thiserror` for
//! all retrieval operations including index access, embedding, reranking,
//! theme routing and configuration. Component errors stay internal to the
//! pipeline; only [`RetrievalError`] crosses the public `retrieve()` boundary.

use thiserror::Error;

/// Result type alias for retrieval-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for retrieval-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Vector index errors (search, scroll).
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Embedding generation errors.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Reranker errors.
    #[error("rerank error: {0}")]
    Rerank(#[from] RerankError),

    /// LLM provider errors (theme routing).
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid state errors.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the invalid state.
        message: String,
    },
}

/// Vector-index-specific errors.
#[derive(Error, Debug)]
pub enum IndexError {
    /// A search request against the index failed.
    #[error("search failed: {0}")]
    SearchFailed(String),

    /// A scroll (full-document fetch) request failed.
    #[error("scroll failed: {0}")]
    ScrollFailed(String),

    /// The index did not answer within the configured deadline.
    #[error("index {operation} timed out after {seconds}s")]
    Timeout {
        /// Operation that timed out (`search` or `scroll`).
        operation: &'static str,
        /// Configured deadline in seconds.
        seconds: u64,
    },

    /// The index is unreachable.
    #[error("index unavailable: {0}")]
    Unavailable(String),
}

/// Embedding-specific errors.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// The embedder failed to produce vectors.
    #[error("embedding failed: {0}")]
    Failed(String),

    /// The embedder did not answer within the configured deadline.
    #[error("embedder timed out after {seconds}s")]
    Timeout {
        /// Configured deadline in seconds.
        seconds: u64,
    },

    /// Dense vector dimension differs from the configured dimension.
    #[error("dense dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension actually produced.
        actual: usize,
    },
}

/// Reranker-specific errors.
#[derive(Error, Debug)]
pub enum RerankError {
    /// Scoring the candidate batch failed.
    #[error("scoring failed: {0}")]
    ScoringFailed(String),

    /// The reranker did not answer within the configured deadline.
    #[error("reranker timed out after {seconds}s")]
    Timeout {
        /// Configured deadline in seconds.
        seconds: u64,
    },

    /// The reranker returned a score list of the wrong length.
    #[error("score count mismatch: expected {expected}, got {actual}")]
    ScoreCountMismatch {
        /// Number of candidates submitted.
        expected: usize,
        /// Number of scores returned.
        actual: usize,
    },
}

/// LLM-provider-specific errors (used by the theme router).
#[derive(Error, Debug)]
pub enum LlmError {
    /// The provider call failed.
    #[error("provider {provider} failed: {message}")]
    Provider {
        /// Provider name.
        provider: String,
        /// Failure description.
        message: String,
    },

    /// The provider returned an empty completion.
    #[error("provider {provider} returned an empty response")]
    EmptyResponse {
        /// Provider name.
        provider: String,
    },

    /// The completion could not be parsed as the expected JSON shape.
    #[error("provider {provider} returned malformed JSON: {message}")]
    MalformedResponse {
        /// Provider name.
        provider: String,
        /// Parse failure description.
        message: String,
    },

    /// The provider did not answer within the configured deadline.
    #[error("provider {provider} timed out after {seconds}s")]
    Timeout {
        /// Provider name.
        provider: String,
        /// Configured deadline in seconds.
        seconds: u64,
    },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// One or more configuration values failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The theme catalog file does not exist.
    #[error("themes config not found: {path}")]
    ThemesNotFound {
        /// Path that was checked.
        path: String,
    },

    /// The theme catalog file could not be parsed.
    #[error("themes config parse error: {0}")]
    ThemesParse(String),

    /// A regex rule in the configuration failed to compile.
    #[error("regex error: {0}")]
    Regex(String),

    /// File read error while loading configuration.
    #[error("failed to read config: {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },
}

/// Terminal outcome of one retrieval request.
///
/// These are the only errors that cross the public API boundary. Each maps
/// to a fixed user-facing message; recoverable failures (reranker down,
/// chunk fetch failed, LLM routing failed) never surface here because the
/// pipeline degrades around them.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Query pre-processing raised.
    #[error("query processing failed: {0}")]
    QueryProcessingFailed(String),

    /// The embedder errored or timed out.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Both index legs failed.
    #[error("search failed: {0}")]
    SearchFailed(String),

    /// Fusion produced an empty list, with and without the filter.
    #[error("no results")]
    NoResults,

    /// The request deadline expired or the caller cancelled.
    #[error("request cancelled")]
    Cancelled,

    /// Anything uncategorized.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RetrievalError {
    /// Stable machine-readable kind, suitable for metrics labels and
    /// client-side dispatch.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::QueryProcessingFailed(_) => "query_processing_failed",
            Self::EmbeddingUnavailable(_) => "embedding_unavailable",
            Self::SearchFailed(_) => "search_failed",
            Self::NoResults => "no_results",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Fixed localized message shown to the end user.
    ///
    /// Detail strings carried by the variants are for logs only and never
    /// reach the user.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::QueryProcessingFailed(_) => {
                "Ошибка обработки запроса. Попробуйте переформулировать вопрос."
            }
            Self::EmbeddingUnavailable(_) => {
                "Сервис эмбеддингов временно недоступен. Попробуйте позже."
            }
            Self::SearchFailed(_) => "Ошибка поиска в базе знаний. Попробуйте позже.",
            Self::NoResults => {
                "К сожалению, не удалось найти релевантную информацию по вашему запросу. \
                 Попробуйте переформулировать вопрос или использовать другие ключевые слова."
            }
            Self::Cancelled => "Запрос был отменён. Попробуйте ещё раз.",
            Self::Internal(_) => {
                "Произошла внутренняя ошибка. Попробуйте позже или обратитесь в поддержку."
            }
        }
    }
}

// Implement From traits for standard library and ecosystem errors

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ThemesParse(err.to_string())
    }
}

impl From<regex::Error> for ConfigError {
    fn from(err: regex::Error) -> Self {
        Self::Regex(err.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse {
            provider: "unknown".to_string(),
            message: err.to_string(),
        }
    }
}
