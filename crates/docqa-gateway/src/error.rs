use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docqa_agent::ServiceFailure;
use docqa_core::{DocqaError, Source};
use serde_json::json;
use tracing::warn;

/// Error returned by every handler, rendered as
/// `{success: false, error, code}` plus `partial`/`sources` when retrieval
/// had already succeeded.
#[derive(Debug)]
pub enum ApiError {
    /// Request body or field rejected before reaching the service.
    BadRequest(String),
    Service {
        error: DocqaError,
        sources: Option<Vec<Source>>,
    },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Service { error, .. } => status_for(error),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Service { error, .. } => error.code(),
        }
    }
}

/// HTTP status for each error kind.
pub fn status_for(error: &DocqaError) -> StatusCode {
    match error {
        DocqaError::InvalidDocument(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DocqaError::NotFound(_) => StatusCode::NOT_FOUND,
        DocqaError::DimensionMismatch { .. } => StatusCode::CONFLICT,
        DocqaError::EmbeddingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DocqaError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        DocqaError::MalformedGeneration(_) | DocqaError::Upstream(_) => StatusCode::BAD_GATEWAY,
        DocqaError::Config(_) | DocqaError::Json(_) | DocqaError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<DocqaError> for ApiError {
    fn from(error: DocqaError) -> Self {
        ApiError::Service {
            error,
            sources: None,
        }
    }
}

impl From<ServiceFailure> for ApiError {
    fn from(failure: ServiceFailure) -> Self {
        ApiError::Service {
            error: failure.error,
            sources: failure.sources,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let body = match self {
            ApiError::BadRequest(message) => json!({
                "success": false,
                "error": message,
                "code": code,
            }),
            ApiError::Service { error, sources } => {
                warn!(code, status = status.as_u16(), error = %error, "Request failed");
                let mut body = json!({
                    "success": false,
                    "error": error.to_string(),
                    "code": code,
                    "retryable": error.is_retryable(),
                });
                if let Some(sources) = sources {
                    body["partial"] = json!(true);
                    body["sources"] = json!(sources);
                }
                body
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use docqa_core::ChunkId;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_status_map() {
        assert_eq!(
            status_for(&DocqaError::InvalidDocument("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&DocqaError::DimensionMismatch {
                expected: 3,
                actual: 4
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&DocqaError::UpstreamTimeout("60s".into())),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&DocqaError::MalformedGeneration("fence".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_total_failure_body() {
        let (status, body) = body_of(DocqaError::NotFound("a.md".into()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "NOT_FOUND");
        assert!(body.get("partial").is_none());
    }

    #[tokio::test]
    async fn test_partial_failure_body_carries_sources() {
        let err = ApiError::Service {
            error: DocqaError::UpstreamTimeout("60s".into()),
            sources: Some(vec![Source {
                document_id: "a.md".into(),
                chunk_id: ChunkId::new("a.md", 0),
                score: 0.5,
            }]),
        };
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["partial"], true);
        assert_eq!(body["retryable"], true);
        assert_eq!(body["sources"][0]["documentId"], "a.md");
        assert_eq!(body["sources"][0]["chunkId"], "a.md#0");
    }
}
