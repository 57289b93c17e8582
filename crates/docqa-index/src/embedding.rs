use async_trait::async_trait;
use docqa_core::{DocqaError, DocqaResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};

/// Trait for computing text embeddings (vector representations).
///
/// Implementations must be deterministic for a given [`model_id`](Self::model_id):
/// the same text always maps to the same vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute embedding vector for a single text.
    async fn embed(&self, text: &str) -> DocqaResult<Vec<f32>>;

    /// Compute embeddings for a batch of texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> DocqaResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimension of the embedding vectors produced by this provider.
    fn dimension(&self) -> usize;

    /// Identifier of the model (and version) that produced the vectors.
    fn model_id(&self) -> &str;
}

/// Build the embedder named in the configuration.
pub fn build_embedder(config: &EmbeddingConfig) -> DocqaResult<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbeddingProviderKind::Local => Arc::new(LocalEmbedding::new(config.dimension)),
        EmbeddingProviderKind::OpenAi => Arc::new(OpenAiEmbedding::new(config)?),
    };
    Ok(embedder)
}

/// Local hashed bag-of-words embedding (no external API needed).
/// Uses TF-based sparse-to-dense mapping with a fixed dimension.
pub struct LocalEmbedding {
    dimension: usize,
    model_id: String,
}

impl LocalEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: format!("local-hash-{dimension}"),
        }
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> DocqaResult<Vec<f32>> {
        if text.is_empty() {
            return Err(DocqaError::InvalidDocument(
                "cannot embed empty text".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimension];
        let words = crate::bm25::tokenize(text);

        let mut freq: HashMap<&str, f32> = HashMap::new();
        for word in &words {
            *freq.entry(word.as_str()).or_insert(0.0) += 1.0;
        }

        let total = words.len() as f32;
        if total == 0.0 {
            return Ok(vector);
        }

        // Three hash slots per word spread collisions out.
        for (word, count) in &freq {
            let tf = count / total;
            let hash1 = simple_hash(word.as_bytes()) as usize;
            let hash2 = simple_hash(&[word.as_bytes(), &[1u8]].concat()) as usize;
            let hash3 = simple_hash(&[word.as_bytes(), &[2u8]].concat()) as usize;

            vector[hash1 % self.dimension] += tf;
            vector[hash2 % self.dimension] += tf * 0.7;
            vector[hash3 % self.dimension] += tf * 0.5;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Simple deterministic hash function (FNV-1a).
fn simple_hash(data: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// Embeddings from an OpenAI-compatible `/v1/embeddings` endpoint.
///
/// Every upstream failure (transport, timeout, non-2xx, unparsable body)
/// surfaces as [`DocqaError::EmbeddingUnavailable`]. Nothing is retried here.
pub struct OpenAiEmbedding {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model_id: String,
    dimension: usize,
    batch_size: usize,
}

impl OpenAiEmbedding {
    pub fn new(config: &EmbeddingConfig) -> DocqaResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocqaError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: format!("{}/v1/embeddings", config.base_url().trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model_id: config
                .model_id
                .clone()
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
        })
    }

    async fn request(&self, inputs: &[String]) -> DocqaResult<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model_id,
            "input": inputs,
        });

        let resp = self
            .http
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| DocqaError::EmbeddingUnavailable(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| DocqaError::EmbeddingUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(DocqaError::EmbeddingUnavailable(format!(
                "embedding API error {status}: {resp_body}"
            )));
        }

        let vectors = parse_embedding_response(&resp_body)?;
        if vectors.len() != inputs.len() {
            return Err(DocqaError::EmbeddingUnavailable(format!(
                "embedding API returned {} vectors for {} inputs",
                vectors.len(),
                inputs.len()
            )));
        }
        for v in &vectors {
            if v.len() != self.dimension {
                return Err(DocqaError::DimensionMismatch {
                    expected: self.dimension,
                    actual: v.len(),
                });
            }
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> DocqaResult<Vec<f32>> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| DocqaError::EmbeddingUnavailable("empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> DocqaResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!(model = %self.model_id, size = batch.len(), "Requesting embedding batch");
            results.extend(self.request(batch).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
pub fn parse_embedding_response(body: &serde_json::Value) -> DocqaResult<Vec<Vec<f32>>> {
    let data = body["data"].as_array().ok_or_else(|| {
        DocqaError::EmbeddingUnavailable("embedding response has no data array".into())
    })?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item["index"].as_u64().map_or(position, |i| i as usize);
        let values = item["embedding"].as_array().ok_or_else(|| {
            DocqaError::EmbeddingUnavailable("embedding item has no vector".into())
        })?;
        let vector = values
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| {
                DocqaError::EmbeddingUnavailable("embedding vector has non-numeric values".into())
            })?;
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
