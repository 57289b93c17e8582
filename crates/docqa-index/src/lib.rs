//! Document ingestion and hybrid retrieval for docqa.
//!
//! Documents flow through a chunk -> embed -> index pipeline driven by the
//! [`DocumentStore`]; query-time search goes through the [`HybridRetriever`],
//! which fuses BM25 and vector rankings over one shared [`IndexContext`].
//!
//! # Main types
//!
//! - [`Chunker`]: Splits text into overlapping token windows with byte offsets.
//! - [`EmbeddingProvider`]: Trait for text embedders; [`LocalEmbedding`] and [`OpenAiEmbedding`].
//! - [`LexicalIndex`]: BM25 inverted index keyed by chunk id.
//! - [`VectorIndex`]: Brute-force nearest-neighbour index with a fixed [`Metric`].
//! - [`IndexContext`]: Shared index state with per-document atomic swaps.
//! - [`DocumentStore`]: Document lifecycle and single-flight preprocessing.
//! - [`HybridRetriever`]: Weighted reciprocal-rank fusion over both indexes.

/// BM25 inverted index and tokenizer.
pub mod bm25;
/// Token-window chunking.
pub mod chunker;
/// Chunking, embedding and retrieval settings.
pub mod config;
/// Shared index state.
pub mod context;
/// Embedding provider trait and implementations.
pub mod embedding;
/// Hybrid retrieval with rank fusion.
pub mod hybrid;
/// Chunk persistence.
pub mod persist;
/// Raw document sources.
pub mod source;
/// Document store and preprocessing pipeline.
pub mod store;
/// Vector index and similarity metrics.
pub mod vector;

pub use bm25::{tokenize, LexicalHit, LexicalIndex};
pub use chunker::{reassemble, ChunkDraft, Chunker};
pub use config::{ChunkingConfig, EmbeddingConfig, EmbeddingProviderKind, RetrievalConfig};
pub use context::{IndexContext, IndexState};
pub use embedding::{build_embedder, EmbeddingProvider, LocalEmbedding, OpenAiEmbedding};
pub use hybrid::{HybridRetriever, RetrievalOptions, SearchMode};
pub use persist::{ChunkStore, FileChunkStore, InMemoryChunkStore, StoredChunks};
pub use source::{DirectorySource, DocumentSource, InMemorySource};
pub use store::{DocumentStore, PreprocessOutcome};
pub use vector::{cosine_similarity, Metric, VectorIndex};
