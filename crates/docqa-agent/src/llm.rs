use crate::backends::claude::ClaudeBackend;
use crate::backends::openai::OpenAiBackend;
use crate::backends::{CompletionRequest, LlmBackend};
use crate::config::{LlmProvider, ModelConfig};
use docqa_core::{DocqaError, DocqaResult, Usage};
use std::time::{Duration, Instant};
use tracing::debug;

/// Text produced by one generation, with provider token accounting if any.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Option<Usage>,
}

/// LLM client that dispatches to the correct provider backend and enforces
/// the generation deadline.
pub struct LlmClient {
    backend: Box<dyn LlmBackend>,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(config: ModelConfig) -> DocqaResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let backend: Box<dyn LlmBackend> = match config.provider {
            LlmProvider::Claude => Box::new(ClaudeBackend::new(config)?),
            LlmProvider::OpenAi | LlmProvider::OpenRouter | LlmProvider::Groq => {
                Box::new(OpenAiBackend::new(config)?)
            }
        };
        Ok(Self { backend, timeout })
    }

    /// Create from a pre-built backend (for custom/external providers).
    pub fn from_backend(backend: Box<dyn LlmBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one completion. Expiry of the deadline is [`DocqaError::UpstreamTimeout`].
    pub async fn complete(&self, request: &CompletionRequest) -> DocqaResult<LlmResponse> {
        let started = Instant::now();
        let response = tokio::time::timeout(self.timeout, self.backend.complete(request))
            .await
            .map_err(|_| {
                DocqaError::UpstreamTimeout(format!(
                    "no answer within {}s",
                    self.timeout.as_secs_f32()
                ))
            })??;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = response.text.len(),
            "LLM completion finished"
        );
        Ok(response)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct SlowBackend;

    #[async_trait]
    impl LlmBackend for SlowBackend {
        async fn complete(&self, _request: &CompletionRequest) -> DocqaResult<LlmResponse> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(LlmResponse {
                text: "late".into(),
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn test_deadline_maps_to_upstream_timeout() {
        let client = LlmClient::from_backend(Box::new(SlowBackend), Duration::from_millis(20));
        let err = client
            .complete(&CompletionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DocqaError::UpstreamTimeout(_)));
        assert!(err.is_retryable());
    }
}
