use super::{map_http_error, CompletionRequest, LlmBackend};
use crate::config::{LlmProvider, ModelConfig};
use crate::llm::LlmResponse;
use async_trait::async_trait;
use docqa_core::{DocqaError, DocqaResult, Role, Usage};
use std::time::Duration;

/// OpenAI-compatible API backend.
///
/// Works with OpenAI, OpenRouter, Groq, Ollama, and any other provider
/// that implements the OpenAI chat completions API.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(config: ModelConfig) -> DocqaResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocqaError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    fn build_messages(&self, request: &CompletionRequest) -> Vec<serde_json::Value> {
        let mut api_messages: Vec<serde_json::Value> = Vec::new();

        if let Some(sys) = &request.system_prompt {
            api_messages.push(serde_json::json!({
                "role": "system",
                "content": sys
            }));
        }

        for m in &request.messages {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            };
            api_messages.push(serde_json::json!({
                "role": role,
                "content": m.content
            }));
        }

        api_messages
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");

        // OpenRouter asks callers to identify themselves
        if matches!(self.config.provider, LlmProvider::OpenRouter) {
            request.header("X-Title", "docqa")
        } else {
            request
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, request: &CompletionRequest) -> DocqaResult<LlmResponse> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());

        let body = serde_json::json!({
            "model": request.model.as_deref().unwrap_or(&self.config.model_id),
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "temperature": request.temperature.unwrap_or(self.config.temperature),
            "messages": self.build_messages(request),
        });

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_http_error("OpenAI", e))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| map_http_error("OpenAI", e))?;

        if !status.is_success() {
            return Err(DocqaError::Upstream(format!(
                "OpenAI API error {status}: {resp_body}"
            )));
        }

        parse_openai_response(&resp_body)
    }
}

pub fn parse_openai_response(body: &serde_json::Value) -> DocqaResult<LlmResponse> {
    let message = &body["choices"][0]["message"];
    if message.is_null() {
        return Err(DocqaError::Upstream(
            "Missing choices in OpenAI response".into(),
        ));
    }
    let text = message["content"].as_str().unwrap_or_default().to_string();

    let usage = &body["usage"];
    let usage = match (
        usage["prompt_tokens"].as_u64(),
        usage["completion_tokens"].as_u64(),
    ) {
        (Some(p), Some(c)) => Some(Usage::new(p as u32, c as u32)),
        _ => None,
    };

    Ok(LlmResponse { text, usage })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_and_usage() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        });
        let resp = parse_openai_response(&body).unwrap();
        assert_eq!(resp.text, "Hello!");
        assert_eq!(resp.usage, Some(Usage::new(12, 3)));
    }

    #[test]
    fn test_parse_without_usage() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": "ok"}}]
        });
        assert!(parse_openai_response(&body).unwrap().usage.is_none());
    }

    #[test]
    fn test_parse_missing_choices() {
        let body = serde_json::json!({"error": {"message": "bad"}});
        assert!(matches!(
            parse_openai_response(&body),
            Err(DocqaError::Upstream(_))
        ));
    }

    #[test]
    fn test_system_prompt_goes_first() {
        let backend = OpenAiBackend::new(ModelConfig::default()).unwrap();
        let request = CompletionRequest {
            system_prompt: Some("be brief".into()),
            messages: vec![docqa_core::Message::user("hi")],
            ..CompletionRequest::default()
        };
        let msgs = backend.build_messages(&request);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[1]["content"], "hi");
    }
}
