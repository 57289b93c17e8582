use crate::document::{ChunkId, DocumentId};
use serde::{Deserialize, Serialize};

/// One ranked passage of a [`RetrievalResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    /// Fused rank score; comparable only within one result.
    pub score: f32,
    /// Vector similarity to the query, when vector search took part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    pub text: String,
}

/// Ordered passages for one query, deduplicated by chunk id. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Citable sources for every passage, in rank order.
    pub fn sources(&self) -> Vec<Source> {
        self.chunks.iter().map(Source::from).collect()
    }
}

/// A cited passage attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub document_id: DocumentId,
    pub chunk_id: ChunkId,
    pub score: f32,
}

impl From<&RetrievedChunk> for Source {
    fn from(chunk: &RetrievedChunk) -> Self {
        Self {
            document_id: chunk.document_id.clone(),
            chunk_id: chunk.chunk_id.clone(),
            score: chunk.score,
        }
    }
}

/// Token accounting reported for one generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}
