use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable document identity, typically the file name the document came from.
pub type DocumentId = String;

/// Preprocessing state of a [`Document`].
///
/// `pending -> processing -> ready`, or `processing -> failed`. Ready and
/// failed documents may re-enter `processing` on an explicit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A document known to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    /// Where the raw content lives (path or collaborator-specific reference).
    pub source: String,
    pub status: DocumentStatus,
    pub chunk_ids: Vec<ChunkId>,
    /// Reason recorded by the last failed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Creates a new `pending` document.
    pub fn new(id: impl Into<DocumentId>, source: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            source: source.into(),
            status: DocumentStatus::Pending,
            chunk_ids: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn begin_processing(&mut self) {
        self.status = DocumentStatus::Processing;
        self.error = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_ready(&mut self, chunk_ids: Vec<ChunkId>) {
        self.status = DocumentStatus::Ready;
        self.chunk_ids = chunk_ids;
        self.error = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.status = DocumentStatus::Failed;
        self.chunk_ids.clear();
        self.error = Some(reason.into());
        self.updated_at = Utc::now();
    }
}

/// Globally unique chunk identity: `(document_id, sequence_index)`.
///
/// Ordering is by document id, then index, which gives retrieval its
/// deterministic "lower chunk id wins" tie-break. Serialized as
/// `"<document_id>#<index>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ChunkId {
    pub document_id: DocumentId,
    pub index: usize,
}

impl ChunkId {
    pub fn new(document_id: impl Into<DocumentId>, index: usize) -> Self {
        Self {
            document_id: document_id.into(),
            index,
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document_id, self.index)
    }
}

impl From<ChunkId> for String {
    fn from(id: ChunkId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ChunkId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (doc, index) = value
            .rsplit_once('#')
            .ok_or_else(|| format!("chunk id '{value}' has no '#' separator"))?;
        let index = index
            .parse::<usize>()
            .map_err(|e| format!("chunk id '{value}' has a bad index: {e}"))?;
        Ok(ChunkId::new(doc, index))
    }
}

/// A bounded passage of a document; the retrieval unit.
///
/// `start..end` are byte offsets into the document text and `text` is exactly
/// that slice. Immutable once indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// Normalized lexical tokens used by the inverted index.
    pub tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn document_id(&self) -> &str {
        &self.id.document_id
    }

    pub fn index(&self) -> usize {
        self.id.index
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_ordering() {
        let a = ChunkId::new("alpha.md", 2);
        let b = ChunkId::new("alpha.md", 10);
        let c = ChunkId::new("beta.md", 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_chunk_id_with_hash_in_document_id() {
        let id = ChunkId::new("notes#draft.txt", 3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"notes#draft.txt#3\"");
        let back: ChunkId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_chunk_id_rejects_garbage() {
        assert!(ChunkId::try_from("no-separator".to_string()).is_err());
        assert!(ChunkId::try_from("doc#x".to_string()).is_err());
    }

    #[test]
    fn test_document_transitions() {
        let mut doc = Document::new("guide.md", "/docs/guide.md");
        assert_eq!(doc.status, DocumentStatus::Pending);

        doc.begin_processing();
        assert_eq!(doc.status, DocumentStatus::Processing);

        doc.mark_failed("embedder down");
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(doc.error.as_deref(), Some("embedder down"));

        doc.begin_processing();
        assert!(doc.error.is_none());
        doc.mark_ready(vec![ChunkId::new("guide.md", 0)]);
        assert_eq!(doc.status, DocumentStatus::Ready);
        assert_eq!(doc.chunk_ids.len(), 1);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&DocumentStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
