use docqa_core::{Chunk, ChunkId, DocqaError, DocqaResult};
use std::collections::HashMap;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::debug;

use crate::bm25::LexicalIndex;
use crate::vector::{Metric, VectorIndex};

/// Everything query-time retrieval reads: postings, vectors and chunk text.
///
/// Only ever mutated through [`IndexContext`], one whole document at a time.
#[derive(Debug)]
pub struct IndexState {
    lexical: LexicalIndex,
    vectors: VectorIndex,
    chunks: HashMap<ChunkId, Chunk>,
}

impl IndexState {
    fn new(dimension: usize, metric: Metric) -> Self {
        Self {
            lexical: LexicalIndex::new(),
            vectors: VectorIndex::new(dimension, metric),
            chunks: HashMap::new(),
        }
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    /// Stored chunk (without its embedding, which lives in the vector index).
    pub fn chunk(&self, id: &ChunkId) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Indexed chunk ids of one document, in sequence order.
    pub fn document_chunk_ids(&self, document_id: &str) -> Vec<ChunkId> {
        let mut ids: Vec<ChunkId> = self
            .chunks
            .keys()
            .filter(|id| id.document_id == document_id)
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    fn remove_document(&mut self, document_id: &str) -> usize {
        self.lexical.remove_document(document_id);
        self.vectors.remove_document(document_id);
        let before = self.chunks.len();
        self.chunks.retain(|id, _| id.document_id != document_id);
        before - self.chunks.len()
    }
}

/// Shared, explicitly passed index state.
///
/// A document's chunk set is swapped in under a single write guard, so a
/// concurrent reader sees either all of the old chunks or all of the new ones.
#[derive(Debug)]
pub struct IndexContext {
    dimension: usize,
    state: RwLock<IndexState>,
}

impl IndexContext {
    pub fn new(dimension: usize, metric: Metric) -> Self {
        Self {
            dimension,
            state: RwLock::new(IndexState::new(dimension, metric)),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Read access for one search. Hold the guard for the whole query so both
    /// lists see the same snapshot.
    pub async fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().await
    }

    /// Replace every indexed chunk of `document_id` with `chunks`.
    ///
    /// All chunks must belong to the document and carry an embedding of the
    /// configured dimension. Validation happens before the write lock is taken;
    /// on error the index is left untouched.
    pub async fn replace_document(
        &self,
        document_id: &str,
        chunks: Vec<Chunk>,
    ) -> DocqaResult<Vec<ChunkId>> {
        let mut prepared = Vec::with_capacity(chunks.len());
        for mut chunk in chunks {
            if chunk.document_id() != document_id {
                return Err(DocqaError::InvalidDocument(format!(
                    "chunk {} does not belong to document '{document_id}'",
                    chunk.id
                )));
            }
            let vector = chunk.embedding.take().ok_or_else(|| {
                DocqaError::InvalidDocument(format!("chunk {} has no embedding", chunk.id))
            })?;
            if vector.len() != self.dimension {
                return Err(DocqaError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
            prepared.push((chunk, vector));
        }

        let ids: Vec<ChunkId> = prepared.iter().map(|(c, _)| c.id.clone()).collect();

        let mut state = self.state.write().await;
        let removed = state.remove_document(document_id);
        for (chunk, vector) in prepared {
            state.lexical.index_chunk(&chunk.id, &chunk.tokens);
            state.vectors.insert(chunk.id.clone(), vector)?;
            state.chunks.insert(chunk.id.clone(), chunk);
        }
        drop(state);

        debug!(document_id, removed, added = ids.len(), "Swapped document chunks");
        Ok(ids)
    }

    /// Drop a document's postings, vectors and chunks. Returns how many chunks went.
    pub async fn remove_document(&self, document_id: &str) -> usize {
        self.state.write().await.remove_document(document_id)
    }

    pub async fn chunk_count(&self) -> usize {
        self.state.read().await.chunk_count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::bm25::tokenize;

    fn chunk(doc: &str, index: usize, text: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: ChunkId::new(doc, index),
            start: 0,
            end: text.len(),
            text: text.to_string(),
            tokens: tokenize(text),
            embedding: Some(embedding),
        }
    }

    #[tokio::test]
    async fn test_replace_swaps_whole_document() {
        let ctx = IndexContext::new(2, Metric::Cosine);
        ctx.replace_document(
            "a.md",
            vec![
                chunk("a.md", 0, "first version alpha", vec![1.0, 0.0]),
                chunk("a.md", 1, "first version beta", vec![0.0, 1.0]),
                chunk("a.md", 2, "first version gamma", vec![1.0, 1.0]),
            ],
        )
        .await
        .unwrap();
        assert_eq!(ctx.chunk_count().await, 3);

        let ids = ctx
            .replace_document("a.md", vec![chunk("a.md", 0, "second", vec![1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(ids, vec![ChunkId::new("a.md", 0)]);

        let state = ctx.read().await;
        assert_eq!(state.chunk_count(), 1);
        assert_eq!(state.vectors().len(), 1);
        assert!(state.lexical().search(&tokenize("alpha"), 10).is_empty());
        assert!(state.chunk(&ChunkId::new("a.md", 2)).is_none());
        assert!(state.chunk(&ChunkId::new("a.md", 0)).unwrap().embedding.is_none());
    }

    #[tokio::test]
    async fn test_bad_vector_leaves_index_untouched() {
        let ctx = IndexContext::new(2, Metric::Cosine);
        ctx.replace_document("a.md", vec![chunk("a.md", 0, "kept text", vec![1.0, 0.0])])
            .await
            .unwrap();

        let err = ctx
            .replace_document(
                "a.md",
                vec![
                    chunk("a.md", 0, "new text", vec![1.0, 0.0]),
                    chunk("a.md", 1, "bad vector", vec![1.0, 0.0, 0.0]),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DocqaError::DimensionMismatch { expected: 2, actual: 3 }));

        let state = ctx.read().await;
        assert_eq!(state.document_chunk_ids("a.md"), vec![ChunkId::new("a.md", 0)]);
        assert_eq!(state.lexical().search(&tokenize("kept"), 10).len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_chunk_rejected() {
        let ctx = IndexContext::new(2, Metric::Cosine);
        let err = ctx
            .replace_document("a.md", vec![chunk("b.md", 0, "wrong owner", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, DocqaError::InvalidDocument(_)));
        assert!(ctx.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_document() {
        let ctx = IndexContext::new(2, Metric::Dot);
        ctx.replace_document("a.md", vec![chunk("a.md", 0, "one", vec![1.0, 0.0])])
            .await
            .unwrap();
        ctx.replace_document("b.md", vec![chunk("b.md", 0, "two", vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(ctx.remove_document("a.md").await, 1);
        let state = ctx.read().await;
        assert!(!state.lexical().contains_document("a.md"));
        assert_eq!(state.document_chunk_ids("b.md").len(), 1);
    }
}
