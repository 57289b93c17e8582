use crate::handlers::{
    chat, delete_document, health, list_documents, preprocess, rag_complete, retriever_query,
};
use crate::middleware::{auth_middleware, AuthConfig};
use crate::sanitize::Sanitizer;
use axum::{
    middleware as axum_mw,
    routing::{delete, get, post},
    Router,
};
use docqa_agent::RagService;
use std::sync::Arc;
use tracing::info;

/// Shared application state.
pub struct AppState {
    pub service: Arc<RagService>,
    pub sanitizer: Sanitizer,
}

/// The main gateway server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway without auth and with default input limits.
    pub fn build(service: Arc<RagService>) -> Router {
        Self::build_with_middleware(service, AuthConfig::default(), Sanitizer::default())
    }

    /// Build the gateway with auth and sanitizing configured.
    ///
    /// `/health` stays reachable without a key.
    pub fn build_with_middleware(
        service: Arc<RagService>,
        auth: AuthConfig,
        sanitizer: Sanitizer,
    ) -> Router {
        info!(
            auth = auth.is_enabled(),
            max_message_length = sanitizer.max_length(),
            "Building gateway routes"
        );

        let state = Arc::new(AppState { service, sanitizer });

        let api = Router::new()
            .route("/documents", get(list_documents))
            .route("/documents/preprocess", post(preprocess))
            .route("/documents/{id}", delete(delete_document))
            .route("/chat", post(chat))
            .route("/retriever/query", post(retriever_query))
            .route("/rag/complete", post(rag_complete))
            .with_state(state);

        let api = if auth.is_enabled() {
            api.layer(axum_mw::from_fn_with_state(Arc::new(auth), auth_middleware))
        } else {
            api
        };

        api.route("/health", get(health))
    }
}
