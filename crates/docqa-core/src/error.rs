use thiserror::Error;

/// A convenience `Result` alias using [`DocqaError`].
pub type DocqaResult<T> = Result<T, DocqaError>;

/// Top-level error type for the docqa service.
///
/// The first six variants form the caller-facing taxonomy; the rest are
/// infrastructure failures that surface through the same channel.
#[derive(Error, Debug)]
pub enum DocqaError {
    /// Empty or unparseable document input. Reported, never retried.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Embedder output or stored vectors disagree with the index dimensionality.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding model could not be reached or returned an error.
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The language model did not answer within the configured timeout.
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// The generated answer failed the well-formedness check.
    #[error("Malformed generation: {0}")]
    MalformedGeneration(String),

    /// Unknown document or chunk id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other language-model transport or API failure.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Invalid or inconsistent configuration.
    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocqaError {
    /// Stable machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DocqaError::InvalidDocument(_) => "INVALID_DOCUMENT",
            DocqaError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            DocqaError::EmbeddingUnavailable(_) => "EMBEDDING_UNAVAILABLE",
            DocqaError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            DocqaError::MalformedGeneration(_) => "MALFORMED_GENERATION",
            DocqaError::NotFound(_) => "NOT_FOUND",
            DocqaError::Upstream(_) => "UPSTREAM_ERROR",
            DocqaError::Config(_) => "CONFIG_ERROR",
            DocqaError::Json(_) => "JSON_ERROR",
            DocqaError::Io(_) => "IO_ERROR",
        }
    }

    /// Whether a caller may retry with backoff.
    ///
    /// Only upstream model unavailability and timeouts qualify; nothing in
    /// this workspace retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DocqaError::EmbeddingUnavailable(_) | DocqaError::UpstreamTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_only_for_upstream_availability() {
        assert!(DocqaError::EmbeddingUnavailable("503".into()).is_retryable());
        assert!(DocqaError::UpstreamTimeout("60s".into()).is_retryable());
        assert!(!DocqaError::MalformedGeneration("fence".into()).is_retryable());
        assert!(!DocqaError::Upstream("400 bad request".into()).is_retryable());
        assert!(!DocqaError::DimensionMismatch {
            expected: 4,
            actual: 3
        }
        .is_retryable());
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = DocqaError::DimensionMismatch {
            expected: 256,
            actual: 384,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 256, got 384");
        assert_eq!(err.code(), "DIMENSION_MISMATCH");
    }
}
