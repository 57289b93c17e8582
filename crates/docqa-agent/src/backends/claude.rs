use super::{map_http_error, CompletionRequest, LlmBackend};
use crate::config::ModelConfig;
use crate::llm::LlmResponse;
use async_trait::async_trait;
use docqa_core::{DocqaError, DocqaResult, Role, Usage};
use serde::Serialize;
use std::time::Duration;

/// Claude (Anthropic) API backend.
pub struct ClaudeBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl ClaudeBackend {
    pub fn new(config: ModelConfig) -> DocqaResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocqaError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }
}

#[derive(Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

/// The messages API takes system text separately; system-role messages in
/// the history are folded into it.
fn split_system(request: &CompletionRequest) -> (Option<String>, Vec<ClaudeMessage>) {
    let mut system_parts: Vec<&str> = request.system_prompt.iter().map(String::as_str).collect();
    let mut messages = Vec::new();
    for m in &request.messages {
        match m.role {
            Role::System => system_parts.push(&m.content),
            Role::User => messages.push(ClaudeMessage {
                role: "user".to_string(),
                content: m.content.clone(),
            }),
            Role::Assistant => messages.push(ClaudeMessage {
                role: "assistant".to_string(),
                content: m.content.clone(),
            }),
        }
    }
    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, messages)
}

#[async_trait]
impl LlmBackend for ClaudeBackend {
    async fn complete(&self, request: &CompletionRequest) -> DocqaResult<LlmResponse> {
        let url = format!("{}/v1/messages", self.config.base_url());
        let (system, api_messages) = split_system(request);

        let mut body = serde_json::json!({
            "model": request.model.as_deref().unwrap_or(&self.config.model_id),
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "temperature": request.temperature.unwrap_or(self.config.temperature),
            "messages": api_messages,
        });

        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_http_error("Claude", e))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| map_http_error("Claude", e))?;

        if !status.is_success() {
            return Err(DocqaError::Upstream(format!(
                "Claude API error {status}: {resp_body}"
            )));
        }

        parse_claude_response(&resp_body)
    }
}

pub fn parse_claude_response(body: &serde_json::Value) -> DocqaResult<LlmResponse> {
    let content = body["content"]
        .as_array()
        .ok_or_else(|| DocqaError::Upstream("Missing content in Claude response".into()))?;

    let text = content
        .iter()
        .filter(|block| block["type"].as_str() == Some("text"))
        .filter_map(|block| block["text"].as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let usage = match (
        body["usage"]["input_tokens"].as_u64(),
        body["usage"]["output_tokens"].as_u64(),
    ) {
        (Some(i), Some(o)) => Some(Usage::new(i as u32, o as u32)),
        _ => None,
    };

    Ok(LlmResponse { text, usage })
}
