#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end tests for the HTTP surface: a real server on a random port,
//! driven with reqwest, answering through a mocked OpenAI-compatible model.

use std::sync::Arc;

use docqa_agent::{
    AnswerComposer, LlmClient, LlmProvider, ModelConfig, RagService, SessionConfig,
    SessionRegistry,
};
use docqa_gateway::{AuthConfig, GatewayServer, Sanitizer};
use docqa_index::{
    Chunker, ChunkingConfig, DocumentStore, HybridRetriever, InMemoryChunkStore, InMemorySource,
    IndexContext, LocalEmbedding, Metric, RetrievalConfig,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper: start the gateway on a random port against `llm`, returning the base URL.
async fn start_test_server(llm: &MockServer) -> String {
    let source = Arc::new(
        InMemorySource::new()
            .with_document(
                "few-shot.md",
                "Few-shot prompting provides examples in the prompt.",
            )
            .with_document("zero-shot.md", "Zero-shot prompting gives no examples."),
    );
    let embedder = Arc::new(LocalEmbedding::new(256));
    let index = Arc::new(IndexContext::new(256, Metric::Cosine));
    let store = Arc::new(DocumentStore::new(
        source,
        Chunker::new(&ChunkingConfig::default()).unwrap(),
        embedder.clone(),
        Arc::clone(&index),
        Arc::new(InMemoryChunkStore::new()),
    ));
    let retriever = HybridRetriever::new(index, embedder, RetrievalConfig::default());
    let config = ModelConfig {
        provider: LlmProvider::OpenAi,
        api_key: "sk-test".to_string(),
        api_base_url: Some(llm.uri()),
        timeout_secs: 5,
        ..ModelConfig::default()
    };
    let service = RagService::new(
        store,
        retriever,
        AnswerComposer::new(Arc::new(LlmClient::new(config).unwrap())),
        SessionRegistry::new(&SessionConfig::default()),
    );
    let app = GatewayServer::build_with_middleware(
        Arc::new(service),
        AuthConfig::default(),
        Sanitizer::default(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://127.0.0.1:{}", addr.port())
}

async fn mock_answer(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": text}}],
            "usage": {"prompt_tokens": 100, "completion_tokens": 20}
        })))
        .mount(server)
        .await;
}

async fn post(url: String, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn preprocess_all(base: &str) {
    let (status, body) = post(
        format!("{base}/documents/preprocess"),
        json!({"documents": []}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_health_endpoint() {
    let llm = MockServer::start().await;
    let base = start_test_server(&llm).await;
    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "docqa");
}

#[tokio::test]
async fn test_preprocess_then_list_documents() {
    let llm = MockServer::start().await;
    let base = start_test_server(&llm).await;

    let (status, body) = post(
        format!("{base}/documents/preprocess"),
        json!({"documents": ["few-shot.md"]}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["results"][0]["documentId"], "few-shot.md");
    assert_eq!(body["results"][0]["status"], "ready");
    assert!(body["results"][0]["chunkCount"].as_u64().unwrap() >= 1);

    let body: Value = reqwest::get(format!("{base}/documents"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let docs = body["documents"].as_array().unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["id"], "few-shot.md");
    assert_eq!(docs[0]["status"], "ready");
    assert_eq!(docs[1]["status"], "pending");
}

#[tokio::test]
async fn test_preprocess_unknown_document_is_404() {
    let llm = MockServer::start().await;
    let base = start_test_server(&llm).await;
    let (status, body) = post(
        format!("{base}/documents/preprocess"),
        json!({"documents": ["nope.md"]}),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_chat_greeting_has_no_metadata() {
    let llm = MockServer::start().await;
    mock_answer(&llm, "Hi! What would you like to know?").await;
    let base = start_test_server(&llm).await;

    let (status, body) = post(format!("{base}/chat"), json!({"message": "hello"})).await;
    assert_eq!(status, 200);
    assert_eq!(body["agent"], "general");
    assert!(body.get("metadata").is_none());
    assert!(body["sessionId"].is_string());
}

#[tokio::test]
async fn test_chat_question_returns_sources_and_session() {
    let llm = MockServer::start().await;
    mock_answer(&llm, "Few-shot prompting includes examples [1].").await;
    let base = start_test_server(&llm).await;
    preprocess_all(&base).await;

    let (status, body) = post(
        format!("{base}/chat"),
        json!({"message": "What is few-shot prompting?"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["agent"], "retrieval");
    assert_eq!(body["message"], "Few-shot prompting includes examples [1].");
    assert_eq!(body["metadata"]["sources"][0]["documentId"], "few-shot.md");

    let session_id = body["sessionId"].as_str().unwrap().to_string();
    let (_, follow) = post(
        format!("{base}/chat"),
        json!({"message": "tell me more", "sessionId": session_id}),
    )
    .await;
    assert_eq!(follow["sessionId"], session_id);
    assert_eq!(follow["agent"], "retrieval");
}

#[tokio::test]
async fn test_retriever_query_payload() {
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("\"temperature\":0.2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "No examples [1]."}}],
            "usage": {"prompt_tokens": 80, "completion_tokens": 5}
        })))
        .expect(1)
        .mount(&llm)
        .await;
    let base = start_test_server(&llm).await;
    preprocess_all(&base).await;

    let (status, body) = post(
        format!("{base}/retriever/query"),
        json!({
            "query": "zero-shot prompting",
            "options": {
                "numResults": 1,
                "similarityThreshold": 0.0,
                "useHybridSearch": true,
                "temperature": 0.2,
                "maxTokens": 100
            }
        }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["query"], "zero-shot prompting");
    assert_eq!(body["response"], "No examples [1].");
    assert_eq!(body["usage"]["totalTokens"], 85);
    assert_eq!(body["sources"].as_array().unwrap().len(), 1);
    assert_eq!(body["sources"][0]["documentId"], "zero-shot.md");
}

#[tokio::test]
async fn test_rag_complete_returns_markdown() {
    let llm = MockServer::start().await;
    mock_answer(&llm, "## Few-shot\n\n```text\nQ: 2+2\nA: 4\n```\n").await;
    let base = start_test_server(&llm).await;
    preprocess_all(&base).await;

    let (status, body) = post(
        format!("{base}/rag/complete"),
        json!({"query": "few-shot example", "options": {}}),
    )
    .await;
    assert_eq!(status, 200);
    assert!(body["response"].as_str().unwrap().starts_with("## Few-shot"));
}

#[tokio::test]
async fn test_malformed_generation_is_partial_failure() {
    let llm = MockServer::start().await;
    mock_answer(&llm, "```\nunterminated").await;
    let base = start_test_server(&llm).await;
    preprocess_all(&base).await;

    let (status, body) = post(
        format!("{base}/retriever/query"),
        json!({"query": "few-shot prompting"}),
    )
    .await;
    assert_eq!(status, 502);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "MALFORMED_GENERATION");
    assert_eq!(body["partial"], true);
    assert!(!body["sources"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_document_then_query_has_no_sources_from_it() {
    let llm = MockServer::start().await;
    mock_answer(&llm, "Nothing relevant.").await;
    let base = start_test_server(&llm).await;
    preprocess_all(&base).await;

    let resp = reqwest::Client::new()
        .delete(format!("{base}/documents/few-shot.md"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let (_, body) = post(
        format!("{base}/retriever/query"),
        json!({"query": "few-shot prompting"}),
    )
    .await;
    assert!(body["sources"]
        .as_array()
        .unwrap()
        .iter()
        .all(|s| s["documentId"] != "few-shot.md"));
}
