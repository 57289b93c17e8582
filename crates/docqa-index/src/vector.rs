use docqa_core::{ChunkId, DocqaError, DocqaResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Similarity metric, fixed when the index is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Dot,
}

impl Metric {
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine_similarity(a, b),
            Metric::Dot => dot(a, b),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity; zero-norm inputs score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot(a, b) / (na * nb)
    }
}

/// Brute-force nearest-neighbour index over chunk embeddings of one fixed
/// dimensionality.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    metric: Metric,
    vectors: HashMap<ChunkId, Vec<f32>>,
    by_document: HashMap<String, BTreeSet<ChunkId>>,
}

impl VectorIndex {
    pub fn new(dimension: usize, metric: Metric) -> Self {
        Self {
            dimension,
            metric,
            vectors: HashMap::new(),
            by_document: HashMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Reject vectors whose length differs from the configured dimension.
    pub fn check_dimension(&self, vector: &[f32]) -> DocqaResult<()> {
        if vector.len() != self.dimension {
            return Err(DocqaError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    pub fn insert(&mut self, id: ChunkId, vector: Vec<f32>) -> DocqaResult<()> {
        self.check_dimension(&vector)?;
        self.by_document
            .entry(id.document_id.clone())
            .or_default()
            .insert(id.clone());
        self.vectors.insert(id, vector);
        Ok(())
    }

    /// Remove every vector of a document. Returns how many were removed.
    pub fn remove_document(&mut self, document_id: &str) -> usize {
        let ids = self.by_document.remove(document_id).unwrap_or_default();
        for id in &ids {
            self.vectors.remove(id);
        }
        ids.len()
    }

    /// Top-k chunks by similarity to the query, highest first, ties by lower chunk id.
    pub fn search(&self, query: &[f32], top_k: usize) -> DocqaResult<Vec<(ChunkId, f32)>> {
        self.check_dimension(query)?;

        let mut scored: Vec<(&ChunkId, f32)> = self
            .vectors
            .iter()
            .map(|(id, v)| (id, self.metric.score(query, v)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        scored.truncate(top_k);

        Ok(scored.into_iter().map(|(id, s)| (id.clone(), s)).collect())
    }

    /// Similarity of one stored chunk to the query.
    pub fn similarity(&self, id: &ChunkId, query: &[f32]) -> Option<f32> {
        self.vectors.get(id).map(|v| self.metric.score(query, v))
    }

    pub fn get(&self, id: &ChunkId) -> Option<&[f32]> {
        self.vectors.get(id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}
