use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use docqa_core::{DocqaError, DocqaResult, Message, RetrievalResult, Source, Usage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backends::CompletionRequest;
use crate::llm::LlmClient;
use crate::session::SessionContext;

const RETRIEVAL_SYSTEM_PROMPT: &str = "You answer questions about a document collection. \
Use only the numbered passages supplied with the question and cite every passage you rely on \
as [n]. If the passages do not contain the answer, say so plainly instead of guessing. \
Format the answer as Markdown.";

const GENERAL_SYSTEM_PROMPT: &str = "You are a concise, friendly assistant for a document \
question-answering service. Reply conversationally without citing documents. \
Format the answer as Markdown.";

/// Per-request generation overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// A composed reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Generated Markdown, unmodified.
    pub text: String,
    /// Cited passages. `None` when retrieval was skipped.
    pub sources: Option<Vec<Source>>,
    pub usage: Usage,
}

/// Builds grounded prompts, calls the model and checks what comes back.
pub struct AnswerComposer {
    llm: Arc<LlmClient>,
}

impl AnswerComposer {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// Answer `query`. With `retrieval` the prompt carries numbered passages
    /// and the answer carries sources; without it the model answers alone.
    pub async fn compose(
        &self,
        query: &str,
        retrieval: Option<&RetrievalResult>,
        session: &SessionContext,
        options: &GenerationOptions,
    ) -> DocqaResult<Answer> {
        let request = build_request(query, retrieval, session, options);
        let response = self.llm.complete(&request).await?;
        check_well_formed(&response.text)?;

        let sources = retrieval.map(|r| cited_sources(&response.text, r));
        let usage = response
            .usage
            .unwrap_or_else(|| estimate_usage(&request, &response.text));

        debug!(
            passages = retrieval.map_or(0, RetrievalResult::len),
            cited = sources.as_ref().map_or(0, Vec::len),
            total_tokens = usage.total_tokens,
            "Composed answer"
        );

        Ok(Answer {
            text: response.text,
            sources,
            usage,
        })
    }
}

pub fn build_request(
    query: &str,
    retrieval: Option<&RetrievalResult>,
    session: &SessionContext,
    options: &GenerationOptions,
) -> CompletionRequest {
    let mut messages = session.history_messages();

    let (system, user) = match retrieval {
        Some(result) => (RETRIEVAL_SYSTEM_PROMPT, passages_prompt(query, result)),
        None => (GENERAL_SYSTEM_PROMPT, query.to_string()),
    };
    messages.push(Message::user(user));

    CompletionRequest {
        system_prompt: Some(system.to_string()),
        messages,
        model: options.model.clone(),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
    }
}

/// Numbered passage block followed by the question.
pub fn passages_prompt(query: &str, result: &RetrievalResult) -> String {
    let mut prompt = String::from("Passages:\n");
    if result.is_empty() {
        prompt.push_str("(no matching passages)\n");
    }
    for (i, chunk) in result.chunks.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "[{}] (source: {}, chunk: {})\n{}\n",
            i + 1,
            chunk.document_id,
            chunk.chunk_id,
            chunk.text.trim()
        );
    }
    let _ = write!(prompt, "\nQuestion: {query}");
    prompt
}

/// Reject replies that are empty, contain replacement or NUL characters, or
/// leave a ``` / ~~~ code fence open.
pub fn check_well_formed(text: &str) -> DocqaResult<()> {
    if text.trim().is_empty() {
        return Err(DocqaError::MalformedGeneration("empty reply".into()));
    }
    if text.contains('\u{FFFD}') || text.contains('\0') {
        return Err(DocqaError::MalformedGeneration(
            "reply contains invalid characters".into(),
        ));
    }

    // (fence char, run length) of the currently open fence
    let mut open: Option<(char, usize)> = None;
    for line in text.lines() {
        let line = line.trim_start();
        let Some(marker) = line.chars().next().filter(|c| *c == '`' || *c == '~') else {
            continue;
        };
        let run = line.chars().take_while(|c| *c == marker).count();
        if run < 3 {
            continue;
        }
        match open {
            None => open = Some((marker, run)),
            Some((m, n)) if m == marker && run >= n && line[run..].trim().is_empty() => {
                open = None;
            }
            Some(_) => {}
        }
    }
    if open.is_some() {
        return Err(DocqaError::MalformedGeneration(
            "unbalanced code fence".into(),
        ));
    }
    Ok(())
}

/// Passages cited as `[n]`, in passage order. A reply that cites nothing
/// is attributed to every passage.
pub fn cited_sources(text: &str, result: &RetrievalResult) -> Vec<Source> {
    let cited = citation_numbers(text, result.len());
    if cited.is_empty() {
        return result.sources();
    }
    cited
        .into_iter()
        .map(|n| Source::from(&result.chunks[n - 1]))
        .collect()
}

fn citation_numbers(text: &str, max: usize) -> BTreeSet<usize> {
    let mut found = BTreeSet::new();
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        rest = &rest[open + 1..];
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        if !digits.is_empty() && rest[digits.len()..].starts_with(']') {
            if let Ok(n) = digits.parse::<usize>() {
                if (1..=max).contains(&n) {
                    found.insert(n);
                }
            }
        }
    }
    found
}

/// Rough token estimation (4 chars ≈ 1 token).
pub fn estimate_usage(request: &CompletionRequest, completion: &str) -> Usage {
    let prompt_chars = request.system_prompt.as_ref().map_or(0, String::len)
        + request.messages.iter().map(|m| m.content.len()).sum::<usize>();
    Usage::new((prompt_chars / 4) as u32, (completion.len() / 4) as u32)
}
