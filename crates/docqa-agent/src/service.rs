use std::sync::Arc;
use std::time::Instant;

use docqa_core::{DocqaError, RetrievalResult, Source, Usage};
use docqa_index::{DocumentStore, HybridRetriever, RetrievalOptions, SearchMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::composer::{AnswerComposer, GenerationOptions};
use crate::router::{AgentKind, AgentRouter};
use crate::session::{SessionContext, SessionRegistry, Turn};

/// A failed request. `sources` is set when retrieval succeeded and only the
/// later generation step failed, so callers can still show the passages.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ServiceFailure {
    #[source]
    pub error: DocqaError,
    pub sources: Option<Vec<Source>>,
}

impl ServiceFailure {
    pub fn is_partial(&self) -> bool {
        self.sources.is_some()
    }
}

impl From<DocqaError> for ServiceFailure {
    fn from(error: DocqaError) -> Self {
        Self {
            error,
            sources: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub message: String,
    pub agent: AgentKind,
    /// Absent when the general agent answered.
    pub sources: Option<Vec<Source>>,
    pub session_id: Uuid,
    pub usage: Usage,
}

/// Options accepted by the direct query path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    #[serde(default)]
    pub num_results: Option<usize>,
    #[serde(default)]
    pub similarity_threshold: Option<f32>,
    #[serde(default)]
    pub use_hybrid_search: Option<bool>,
    #[serde(flatten)]
    pub generation: GenerationOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryReply {
    pub response: String,
    pub sources: Vec<Source>,
    pub usage: Usage,
}

/// Query-time orchestration: routing, retrieval and answer composition over
/// one document store.
pub struct RagService {
    store: Arc<DocumentStore>,
    retriever: HybridRetriever,
    router: AgentRouter,
    composer: AnswerComposer,
    sessions: SessionRegistry,
}

impl RagService {
    pub fn new(
        store: Arc<DocumentStore>,
        retriever: HybridRetriever,
        composer: AnswerComposer,
        sessions: SessionRegistry,
    ) -> Self {
        Self {
            store,
            retriever,
            router: AgentRouter::new(),
            composer,
            sessions,
        }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    /// Conversational entry point: route, retrieve if needed, answer, remember.
    pub async fn chat(
        &self,
        message: &str,
        session_id: Option<Uuid>,
    ) -> Result<ChatReply, ServiceFailure> {
        let started = Instant::now();
        let session = self.sessions.snapshot(session_id);
        let decision = self.router.route(message, &session);

        let retrieval = if decision.needs_retrieval {
            let options = self.retriever.default_options();
            Some(self.retriever.retrieve(message, &options).await?)
        } else {
            None
        };

        let answer = self
            .composer
            .compose(
                message,
                retrieval.as_ref(),
                &session,
                &GenerationOptions::default(),
            )
            .await
            .map_err(|error| partial(error, retrieval.as_ref().map(RetrievalResult::sources)))?;

        self.sessions.record(
            session.id,
            Turn {
                query: message.to_string(),
                answer: answer.text.clone(),
                agent: decision.agent,
            },
        );

        info!(
            agent = %decision.agent,
            reason = decision.reason,
            session_id = %session.id,
            sources = answer.sources.as_ref().map_or(0, Vec::len),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Chat answered"
        );

        Ok(ChatReply {
            message: answer.text,
            agent: decision.agent,
            sources: answer.sources,
            session_id: session.id,
            usage: answer.usage,
        })
    }

    /// Retrieval plus composition without routing or session memory.
    pub async fn query(
        &self,
        query: &str,
        options: &QueryOptions,
    ) -> Result<QueryReply, ServiceFailure> {
        let started = Instant::now();
        let defaults = self.retriever.default_options();
        let retrieval_options = RetrievalOptions {
            num_results: options.num_results.unwrap_or(defaults.num_results),
            similarity_threshold: options
                .similarity_threshold
                .unwrap_or(defaults.similarity_threshold),
            mode: options
                .use_hybrid_search
                .map_or(defaults.mode, SearchMode::from_hybrid_flag),
        };

        let retrieval = self.retriever.retrieve(query, &retrieval_options).await?;
        let answer = self
            .composer
            .compose(
                query,
                Some(&retrieval),
                &SessionContext::ephemeral(),
                &options.generation,
            )
            .await
            .map_err(|error| partial(error, Some(retrieval.sources())))?;

        info!(
            num_results = retrieval.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query answered"
        );

        Ok(QueryReply {
            response: answer.text,
            sources: answer.sources.unwrap_or_default(),
            usage: answer.usage,
        })
    }

    /// Single-shot RAG with configured defaults.
    pub async fn complete(
        &self,
        query: &str,
        generation: &GenerationOptions,
    ) -> Result<QueryReply, ServiceFailure> {
        self.query(
            query,
            &QueryOptions {
                generation: generation.clone(),
                ..QueryOptions::default()
            },
        )
        .await
    }
}

fn partial(error: DocqaError, sources: Option<Vec<Source>>) -> ServiceFailure {
    if sources.is_some() {
        warn!(error = %error, "Generation failed after retrieval");
    }
    ServiceFailure { error, sources }
}
