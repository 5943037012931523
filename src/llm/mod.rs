//! Pluggable LLM provider interface.
//!
//! Used by the theme router's optional LLM classification path.
//! Implementations translate the provider-agnostic [`CompletionRequest`]
//! into provider-specific SDK calls, keeping routing logic decoupled from
//! any particular vendor. Providers are tried in configured order; any
//! failure falls through to the next one.

use async_trait::async_trait;

use crate::error::LlmError;

/// Provider-agnostic completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System prompt.
    pub system_prompt: String,
    /// User prompt.
    pub user_prompt: String,
    /// Maximum completion tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Trait for LLM provider backends.
///
/// Implementations must be thread-safe (`Send + Sync`); one client instance
/// is shared across all in-flight requests.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g. `"yandex"`, `"deepseek"`), used in logs and
    /// error context.
    fn name(&self) -> &str;

    /// Executes a completion request and returns the raw text answer.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on API failures, timeouts, or empty responses.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
            if request.user_prompt.is_empty() {
                return Err(LlmError::EmptyResponse {
                    provider: self.name().to_string(),
                });
            }
            Ok(request.user_prompt.clone())
        }
    }

    #[tokio::test]
    async fn test_provider_complete() {
        let provider = EchoProvider;
        let request = CompletionRequest {
            system_prompt: "classify".to_string(),
            user_prompt: "ping".to_string(),
            max_tokens: 400,
            temperature: 0.0,
        };
        assert_eq!(provider.complete(&request).await.unwrap(), "ping");
    }

    #[tokio::test]
    async fn test_provider_empty_response() {
        let provider = EchoProvider;
        let request = CompletionRequest {
            system_prompt: String::new(),
            user_prompt: String::new(),
            max_tokens: 400,
            temperature: 0.0,
        };
        assert!(matches!(
            provider.complete(&request).await,
            Err(LlmError::EmptyResponse { .. })
        ));
    }
}
