pub mod claude;
pub mod openai;

use crate::llm::LlmResponse;
use async_trait::async_trait;
use docqa_core::{DocqaError, DocqaResult, Message};

/// One generation request. `None` overrides fall back to the backend's
/// [`ModelConfig`](crate::config::ModelConfig).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Trait for LLM provider backends.
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `LlmBackend` for your struct
/// 3. Add the variant to `LlmProvider` enum in `config.rs`
/// 4. Wire it up in `LlmClient::new()` in `llm.rs`
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> DocqaResult<LlmResponse>;
}

/// Transport errors: timeouts keep their own variant, everything else is upstream.
pub(crate) fn map_http_error(provider: &str, e: reqwest::Error) -> DocqaError {
    if e.is_timeout() {
        DocqaError::UpstreamTimeout(format!("{provider} request timed out"))
    } else {
        DocqaError::Upstream(format!("{provider} request failed: {e}"))
    }
}
