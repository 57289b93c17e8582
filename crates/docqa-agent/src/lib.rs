//! Query-time agents for the docqa service.
//!
//! Routes each message to a general or retrieval agent, composes grounded
//! answers through a pluggable LLM backend, and keeps short per-session
//! conversation memory.

pub mod backends;
pub mod composer;
pub mod config;
pub mod llm;
pub mod router;
pub mod service;
pub mod session;

pub use backends::{CompletionRequest, LlmBackend};
pub use composer::{Answer, AnswerComposer, GenerationOptions};
pub use config::{LlmProvider, ModelConfig};
pub use llm::{LlmClient, LlmResponse};
pub use router::{AgentDecision, AgentKind, AgentRouter};
pub use service::{ChatReply, QueryOptions, QueryReply, RagService, ServiceFailure};
pub use session::{SessionConfig, SessionContext, SessionRegistry, Turn};
