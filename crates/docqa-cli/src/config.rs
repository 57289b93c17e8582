use anyhow::{bail, Context};
use docqa_agent::{ModelConfig, SessionConfig};
use docqa_index::{ChunkingConfig, EmbeddingConfig, RetrievalConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const LLM_KEY_VAR: &str = "DOCQA_LLM_API_KEY";
pub const EMBEDDING_KEY_VAR: &str = "DOCQA_EMBEDDING_API_KEY";

/// Contents of `docqa.toml`. Every section is optional.
#[derive(Debug, Deserialize)]
pub struct DocqaConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DocumentsConfig {
    /// Directory the document source reads from.
    #[serde(default = "default_documents_dir")]
    pub dir: PathBuf,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: default_documents_dir(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default = "default_max_msg_len")]
    pub max_message_length: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_keys: vec![],
            max_message_length: default_max_msg_len(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_documents_dir() -> PathBuf {
    PathBuf::from("./documents")
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_max_msg_len() -> usize {
    100_000
}

impl Default for DocqaConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            documents: DocumentsConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            model: ModelConfig::default(),
            session: SessionConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl DocqaConfig {
    /// Read `path`, falling back to defaults when it does not exist, then
    /// fill empty API keys from the environment and validate.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if tokio::fs::try_exists(path).await.unwrap_or(false) {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
            Self::parse(&raw)
                .with_context(|| format!("Invalid config file '{}'", path.display()))?
        } else {
            info!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };

        config.fill_api_keys(|var| std::env::var(var).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Empty `api_key` fields take the value `lookup` returns for their
    /// environment variable.
    pub fn fill_api_keys(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.model.api_key.is_empty() {
            if let Some(key) = lookup(LLM_KEY_VAR) {
                self.model.api_key = key;
            }
        }
        if self.embedding.api_key.is_empty() {
            if let Some(key) = lookup(EMBEDDING_KEY_VAR) {
                self.embedding.api_key = key;
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.chunking.validate()?;
        if self.embedding.dimension == 0 {
            bail!("embedding.dimension must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.retrieval.vector_weight) {
            bail!(
                "retrieval.vector_weight must be within 0.0..=1.0, got {}",
                self.retrieval.vector_weight
            );
        }
        if self.retrieval.rrf_k <= 0.0 {
            bail!("retrieval.rrf_k must be positive");
        }
        Ok(())
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.data_dir.join("chunks")
    }
}
