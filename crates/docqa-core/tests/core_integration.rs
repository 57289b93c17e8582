#![allow(clippy::unwrap_used, clippy::expect_used)]

use docqa_core::*;

// ---------------------------------------------------------------------------
// 1. Error codes and Display
// ---------------------------------------------------------------------------

#[test]
fn error_display_and_codes() {
    let cases = [
        (
            DocqaError::InvalidDocument("empty".into()),
            "Invalid document: empty",
            "INVALID_DOCUMENT",
        ),
        (
            DocqaError::EmbeddingUnavailable("connection refused".into()),
            "Embedding unavailable: connection refused",
            "EMBEDDING_UNAVAILABLE",
        ),
        (
            DocqaError::UpstreamTimeout("after 60s".into()),
            "Upstream timeout: after 60s",
            "UPSTREAM_TIMEOUT",
        ),
        (
            DocqaError::MalformedGeneration("unbalanced code fence".into()),
            "Malformed generation: unbalanced code fence",
            "MALFORMED_GENERATION",
        ),
        (
            DocqaError::NotFound("document 'x.md'".into()),
            "Not found: document 'x.md'",
            "NOT_FOUND",
        ),
    ];

    for (err, display, code) in cases {
        assert_eq!(err.to_string(), display);
        assert_eq!(err.code(), code);
    }
}

#[test]
fn error_from_impls() {
    let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let err: DocqaError = json_err.into();
    assert_eq!(err.code(), "JSON_ERROR");

    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: DocqaError = io_err.into();
    assert!(err.to_string().contains("gone"));
}

// ---------------------------------------------------------------------------
// 2. Retrieval result serialization
// ---------------------------------------------------------------------------

#[test]
fn retrieval_result_sources_keep_rank_order() {
    let result = RetrievalResult {
        chunks: vec![
            RetrievedChunk {
                chunk_id: ChunkId::new("b.md", 1),
                document_id: "b.md".into(),
                score: 0.03,
                similarity: Some(0.8),
                text: "second doc".into(),
            },
            RetrievedChunk {
                chunk_id: ChunkId::new("a.md", 0),
                document_id: "a.md".into(),
                score: 0.02,
                similarity: None,
                text: "first doc".into(),
            },
        ],
    };

    let sources = result.sources();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0].document_id, "b.md");
    assert_eq!(sources[1].chunk_id, ChunkId::new("a.md", 0));

    let json = serde_json::to_value(&result.chunks[0]).unwrap();
    assert_eq!(json["chunkId"], "b.md#1");
    assert_eq!(json["documentId"], "b.md");
    let json = serde_json::to_value(&result.chunks[1]).unwrap();
    assert!(json.get("similarity").is_none());
}

#[test]
fn usage_totals() {
    let usage = Usage::new(120, 30);
    assert_eq!(usage.total_tokens, 150);
    let json = serde_json::to_value(usage).unwrap();
    assert_eq!(json["promptTokens"], 120);
    assert_eq!(json["totalTokens"], 150);
}

// ---------------------------------------------------------------------------
// 3. Document serialization
// ---------------------------------------------------------------------------

#[test]
fn document_serialization_roundtrip() {
    let mut doc = Document::new("prompting.md", "docs/prompting.md");
    doc.begin_processing();
    doc.mark_ready(vec![ChunkId::new("prompting.md", 0), ChunkId::new("prompting.md", 1)]);

    let json = serde_json::to_value(&doc).unwrap();
    assert_eq!(json["status"], "ready");
    assert_eq!(json["chunkIds"][1], "prompting.md#1");
    assert!(json.get("error").is_none());

    let back: Document = serde_json::from_value(json).unwrap();
    assert_eq!(back.id, "prompting.md");
    assert_eq!(back.chunk_ids, doc.chunk_ids);
}

#[test]
fn message_constructors() {
    let m = Message::system("be brief");
    assert_eq!(m.role, Role::System);
    let json = serde_json::to_string(&Message::user("hi")).unwrap();
    assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
}
