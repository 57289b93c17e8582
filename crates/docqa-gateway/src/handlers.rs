use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use docqa_agent::{AgentKind, GenerationOptions, QueryOptions};
use docqa_core::{Document, DocumentId, DocumentStatus, Source, Usage};
use docqa_index::PreprocessOutcome;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PreprocessRequest {
    /// Empty = every document not yet ready.
    #[serde(default)]
    pub documents: Vec<DocumentId>,
}

#[derive(Debug, Serialize)]
pub struct PreprocessResponse {
    pub success: bool,
    pub results: Vec<PreprocessOutcome>,
}

#[derive(Debug, Serialize)]
pub struct DocumentsResponse {
    pub success: bool,
    pub documents: Vec<Document>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ChatMetadata {
    pub sources: Vec<Source>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub message: String,
    pub agent: AgentKind,
    pub session_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChatMetadata>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub options: QueryOptions,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    pub query: String,
    pub response: String,
    pub usage: Usage,
    pub sources: Vec<Source>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub query: String,
    #[serde(default)]
    pub options: GenerationOptions,
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub response: String,
}

/// `POST /documents/preprocess`
pub async fn preprocess(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PreprocessRequest>, JsonRejection>,
) -> Result<Json<PreprocessResponse>, ApiError> {
    let Json(req) = payload?;
    let results = state.service.store().preprocess_many(&req.documents).await?;
    let success = results.iter().all(|r| r.status == DocumentStatus::Ready);
    info!(
        requested = req.documents.len(),
        processed = results.len(),
        success,
        "Preprocess request finished"
    );
    Ok(Json(PreprocessResponse { success, results }))
}

/// `GET /documents`
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DocumentsResponse>, ApiError> {
    let documents = state.service.store().list().await?;
    Ok(Json(DocumentsResponse {
        success: true,
        documents,
    }))
}

/// `DELETE /documents/{id}`
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let document = state.service.store().delete(&id).await?;
    Ok(Json(json!({"success": true, "document": document})))
}

/// `POST /chat`
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = payload?;
    let message = state.sanitizer.clean("message", &req.message)?;
    let reply = state.service.chat(&message, req.session_id).await?;
    Ok(Json(ChatResponse {
        message: reply.message,
        agent: reply.agent,
        session_id: reply.session_id,
        metadata: reply.sources.map(|sources| ChatMetadata { sources }),
        usage: reply.usage,
    }))
}

/// `POST /retriever/query`
pub async fn retriever_query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(req) = payload?;
    let query = state.sanitizer.clean("query", &req.query)?;
    let reply = state.service.query(&query, &req.options).await?;
    Ok(Json(QueryResponse {
        success: true,
        query,
        response: reply.response,
        usage: reply.usage,
        sources: reply.sources,
    }))
}

/// `POST /rag/complete`
pub async fn rag_complete(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CompleteRequest>, JsonRejection>,
) -> Result<Json<CompleteResponse>, ApiError> {
    let Json(req) = payload?;
    let query = state.sanitizer.clean("query", &req.query)?;
    let reply = state.service.complete(&query, &req.options).await?;
    Ok(Json(CompleteResponse {
        response: reply.response,
    }))
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": "docqa"}))
}
