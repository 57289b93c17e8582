use docqa_core::{DocqaError, DocqaResult};
use serde::{Deserialize, Serialize};

use crate::vector::Metric;

/// How documents are split into passages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
}

fn default_chunk_size() -> usize {
    200
}

fn default_overlap() -> usize {
    40
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: default_chunk_size(),
            overlap_tokens: default_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> DocqaResult<()> {
        if self.chunk_size_tokens == 0 {
            return Err(DocqaError::Config(
                "chunk_size_tokens must be greater than zero".to_string(),
            ));
        }
        if self.overlap_tokens >= self.chunk_size_tokens {
            return Err(DocqaError::Config(format!(
                "overlap_tokens ({}) must be smaller than chunk_size_tokens ({})",
                self.overlap_tokens, self.chunk_size_tokens
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Hashed bag-of-words embedder, no network access.
    Local,
    /// Any OpenAI-compatible `/v1/embeddings` endpoint.
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProviderKind,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::Local
}

fn default_dimension() -> usize {
    256
}

fn default_batch_size() -> usize {
    32
}

fn default_embedding_timeout() -> u64 {
    30
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model_id: None,
            dimension: default_dimension(),
            api_key: String::new(),
            api_base_url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl EmbeddingConfig {
    pub fn base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or("https://api.openai.com")
    }
}

/// Retrieval tuning shared by every query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Each list is searched for `num_results * overfetch_factor` candidates.
    #[serde(default = "default_overfetch")]
    pub overfetch_factor: usize,
    /// Reciprocal-rank-fusion constant. Higher values smooth out rank differences.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
    /// Weight of the vector list in hybrid fusion; the lexical list gets the rest.
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,
    #[serde(default = "default_num_results")]
    pub num_results: usize,
    #[serde(default)]
    pub similarity_threshold: f32,
    #[serde(default)]
    pub metric: Metric,
}

fn default_overfetch() -> usize {
    3
}

fn default_rrf_k() -> f32 {
    60.0
}

fn default_vector_weight() -> f32 {
    0.5
}

fn default_num_results() -> usize {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            overfetch_factor: default_overfetch(),
            rrf_k: default_rrf_k(),
            vector_weight: default_vector_weight(),
            num_results: default_num_results(),
            similarity_threshold: 0.0,
            metric: Metric::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_chunking_validation() {
        assert!(ChunkingConfig::default().validate().is_ok());

        let zero = ChunkingConfig {
            chunk_size_tokens: 0,
            overlap_tokens: 0,
        };
        assert!(zero.validate().is_err());

        let overlap_too_big = ChunkingConfig {
            chunk_size_tokens: 10,
            overlap_tokens: 10,
        };
        assert!(matches!(
            overlap_too_big.validate(),
            Err(DocqaError::Config(_))
        ));
    }

    #[test]
    fn test_retrieval_defaults_from_empty_json() {
        let config: RetrievalConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.overfetch_factor, 3);
        assert_eq!(config.rrf_k, 60.0);
        assert_eq!(config.num_results, 5);
        assert_eq!(config.metric, Metric::Cosine);
    }

    #[test]
    fn test_embedding_provider_parse() {
        let config: EmbeddingConfig =
            serde_json::from_str(r#"{"provider": "openai", "dimension": 1536}"#).unwrap();
        assert_eq!(config.provider, EmbeddingProviderKind::OpenAi);
        assert_eq!(config.dimension, 1536);
        assert_eq!(config.base_url(), "https://api.openai.com");
    }
}
