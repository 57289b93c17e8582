//! Core types and error definitions for the docqa retrieval service.
//!
//! This crate provides the foundational types shared across all docqa crates:
//! the error taxonomy, the document/chunk data model, retrieval results and
//! the chat message representation handed to language-model backends.
//!
//! # Main types
//!
//! - [`DocqaError`]: Unified error enum for all docqa subsystems.
//! - [`DocqaResult`]: Convenience alias for `Result<T, DocqaError>`.
//! - [`Document`] / [`DocumentStatus`]: Document identity and preprocessing state.
//! - [`Chunk`] / [`ChunkId`]: The retrieval unit and its globally unique id.
//! - [`RetrievalResult`]: Ranked passages produced fresh per query.
//! - [`Message`] / [`Role`]: Conversation messages sent to an LLM.

/// Document, chunk and chunk-id types.
pub mod document;
/// Error taxonomy.
pub mod error;
/// Chat message types.
pub mod message;
/// Retrieval results, sources and token usage.
pub mod retrieval;

pub use document::{Chunk, ChunkId, Document, DocumentId, DocumentStatus};
pub use error::{DocqaError, DocqaResult};
pub use message::{Message, Role};
pub use retrieval::{RetrievalResult, RetrievedChunk, Source, Usage};
