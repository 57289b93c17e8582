use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use docqa_core::{ChunkId, DocqaResult, RetrievalResult, RetrievedChunk};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bm25::tokenize;
use crate::config::RetrievalConfig;
use crate::context::IndexContext;
use crate::embedding::EmbeddingProvider;

/// Which ranked lists take part in a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Vector,
    Lexical,
    #[default]
    Hybrid,
}

impl SearchMode {
    /// `useHybridSearch` on the wire selects hybrid or vector-only.
    pub fn from_hybrid_flag(use_hybrid_search: bool) -> Self {
        if use_hybrid_search {
            SearchMode::Hybrid
        } else {
            SearchMode::Vector
        }
    }

    pub fn uses_vectors(self) -> bool {
        matches!(self, SearchMode::Vector | SearchMode::Hybrid)
    }

    pub fn uses_lexical(self) -> bool {
        matches!(self, SearchMode::Lexical | SearchMode::Hybrid)
    }
}

/// Per-query retrieval options.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOptions {
    pub num_results: usize,
    /// Minimum vector similarity a passage needs when vectors take part.
    pub similarity_threshold: f32,
    pub mode: SearchMode,
}

impl RetrievalOptions {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            num_results: config.num_results,
            similarity_threshold: config.similarity_threshold,
            mode: SearchMode::Hybrid,
        }
    }

    pub fn with_num_results(mut self, num_results: usize) -> Self {
        self.num_results = num_results;
        self
    }

    pub fn with_threshold(mut self, similarity_threshold: f32) -> Self {
        self.similarity_threshold = similarity_threshold;
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

#[derive(Debug, Default)]
struct Candidate {
    vector_rank: Option<usize>,
    lexical_rank: Option<usize>,
    similarity: Option<f32>,
}

/// Hybrid retriever that combines dense vector search with BM25 keyword
/// search using weighted Reciprocal Rank Fusion (RRF).
///
/// ```text
/// score = w / (rrf_k + vector_rank) + (1 - w) / (rrf_k + lexical_rank)
/// ```
///
/// Ranks are 1-based and a list the candidate is missing from adds nothing.
/// Single-list modes score `1 / (rrf_k + rank)`.
pub struct HybridRetriever {
    index: Arc<IndexContext>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        index: Arc<IndexContext>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Default options for this retriever's configuration.
    pub fn default_options(&self) -> RetrievalOptions {
        RetrievalOptions::from_config(&self.config)
    }

    /// Rank indexed passages for `query`.
    ///
    /// An empty index or `num_results == 0` yields an empty result without
    /// calling the embedder. Embedder and index errors propagate unchanged.
    pub async fn retrieve(
        &self,
        query: &str,
        options: &RetrievalOptions,
    ) -> DocqaResult<RetrievalResult> {
        let started = Instant::now();
        if options.num_results == 0 || self.index.read().await.is_empty() {
            return Ok(RetrievalResult::empty());
        }

        let fetch_k = options
            .num_results
            .saturating_mul(self.config.overfetch_factor.max(1));

        let query_vector = if options.mode.uses_vectors() {
            Some(self.embedder.embed(query).await?)
        } else {
            None
        };

        let state = self.index.read().await;
        let mut candidates: HashMap<ChunkId, Candidate> = HashMap::new();

        if let Some(qv) = &query_vector {
            let hits = state.vectors().search(qv, fetch_k)?;
            for (rank, (id, similarity)) in hits.into_iter().enumerate() {
                let c = candidates.entry(id).or_default();
                c.vector_rank = Some(rank + 1);
                c.similarity = Some(similarity);
            }
        }

        if options.mode.uses_lexical() {
            let tokens = tokenize(query);
            for (rank, hit) in state.lexical().search(&tokens, fetch_k).into_iter().enumerate() {
                let c = candidates.entry(hit.chunk_id).or_default();
                c.lexical_rank = Some(rank + 1);
            }
        }

        let (vector_weight, lexical_weight) = match options.mode {
            SearchMode::Hybrid => {
                let w = self.config.vector_weight.clamp(0.0, 1.0);
                (w, 1.0 - w)
            }
            SearchMode::Vector => (1.0, 0.0),
            SearchMode::Lexical => (0.0, 1.0),
        };
        let k = self.config.rrf_k;
        let candidate_count = candidates.len();

        let mut fused: Vec<(ChunkId, f32, Option<f32>)> = candidates
            .into_iter()
            .filter_map(|(id, c)| {
                let similarity = match (&query_vector, c.similarity) {
                    (Some(_), Some(s)) => Some(s),
                    (Some(qv), None) => state.vectors().similarity(&id, qv),
                    (None, _) => None,
                };
                if options.mode.uses_vectors()
                    && similarity.unwrap_or(f32::NEG_INFINITY) < options.similarity_threshold
                {
                    return None;
                }

                let mut score = 0.0;
                if let Some(rank) = c.vector_rank {
                    score += vector_weight / (k + rank as f32);
                }
                if let Some(rank) = c.lexical_rank {
                    score += lexical_weight / (k + rank as f32);
                }
                Some((id, score, similarity))
            })
            .collect();

        fused.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        fused.truncate(options.num_results);

        let chunks: Vec<RetrievedChunk> = fused
            .into_iter()
            .filter_map(|(id, score, similarity)| {
                state.chunk(&id).map(|chunk| RetrievedChunk {
                    document_id: id.document_id.clone(),
                    chunk_id: id,
                    score,
                    similarity,
                    text: chunk.text.clone(),
                })
            })
            .collect();
        drop(state);

        debug!(candidates = candidate_count, "Fused retrieval candidates");
        info!(
            mode = ?options.mode,
            num_results = chunks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Retrieved passages"
        );

        Ok(RetrievalResult { chunks })
    }
}
