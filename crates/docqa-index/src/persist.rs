use async_trait::async_trait;
use docqa_core::{Chunk, DocqaError, DocqaResult, DocumentId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

/// One document's persisted chunk set, embeddings included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredChunks {
    pub document_id: DocumentId,
    /// Embedder that produced the vectors.
    pub model_id: String,
    pub chunks: Vec<Chunk>,
}

/// Persistence collaborator for indexed chunks. The in-memory index is
/// rebuildable from whatever this returns.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Store (replacing) the chunk set of one document.
    async fn put(&self, stored: &StoredChunks) -> DocqaResult<()>;
    /// Forget a document. Returns false if nothing was stored.
    async fn delete(&self, document_id: &str) -> DocqaResult<bool>;
    async fn load_all(&self) -> DocqaResult<Vec<StoredChunks>>;
}

#[derive(Default)]
pub struct InMemoryChunkStore {
    entries: RwLock<BTreeMap<DocumentId, StoredChunks>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn put(&self, stored: &StoredChunks) -> DocqaResult<()> {
        self.entries
            .write()
            .insert(stored.document_id.clone(), stored.clone());
        Ok(())
    }

    async fn delete(&self, document_id: &str) -> DocqaResult<bool> {
        Ok(self.entries.write().remove(document_id).is_some())
    }

    async fn load_all(&self) -> DocqaResult<Vec<StoredChunks>> {
        Ok(self.entries.read().values().cloned().collect())
    }
}

/// File-based chunk store: one JSON file per document.
pub struct FileChunkStore {
    dir: PathBuf,
}

impl FileChunkStore {
    pub async fn new(dir: PathBuf) -> DocqaResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn document_path(&self, document_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_file_stem(document_id)))
    }
}

#[async_trait]
impl ChunkStore for FileChunkStore {
    async fn put(&self, stored: &StoredChunks) -> DocqaResult<()> {
        let path = self.document_path(&stored.document_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec(stored)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, document_id: &str) -> DocqaResult<bool> {
        let path = self.document_path(document_id);
        if !path.exists() {
            return Ok(false);
        }
        tokio::fs::remove_file(path).await?;
        Ok(true)
    }

    async fn load_all(&self) -> DocqaResult<Vec<StoredChunks>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut loaded = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let named = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| decode_file_stem(s).ok());
            let data = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<StoredChunks>(&data) {
                Ok(stored) if named.as_deref() == Some(stored.document_id.as_str()) => {
                    loaded.push(stored);
                }
                Ok(stored) => {
                    // delete() could never find it under this name
                    warn!(
                        path = %path.display(),
                        document_id = %stored.document_id,
                        "Skipping chunk file named for another document"
                    );
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable chunk file");
                }
            }
        }
        loaded.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        Ok(loaded)
    }
}

/// Percent-encode everything outside `[A-Za-z0-9._-]` so any document id maps
/// to a single flat file name.
fn encode_file_stem(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' => out.push(byte as char),
            b'.' if !out.is_empty() => out.push('.'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Inverse of [`encode_file_stem`].
fn decode_file_stem(stem: &str) -> DocqaResult<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem
                .get(i + 1..i + 3)
                .ok_or_else(|| DocqaError::Config(format!("bad escape in '{stem}'")))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| DocqaError::Config(format!("bad escape in '{stem}'")))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| DocqaError::Config(format!("bad escape in '{stem}'")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use docqa_core::ChunkId;

    fn stored(doc: &str) -> StoredChunks {
        StoredChunks {
            document_id: doc.to_string(),
            model_id: "local-hash-4".to_string(),
            chunks: vec![Chunk {
                id: ChunkId::new(doc, 0),
                start: 0,
                end: 5,
                text: "hello".to_string(),
                tokens: vec!["hello".to_string()],
                embedding: Some(vec![1.0, 0.0, 0.0, 0.0]),
            }],
        }
    }

    #[test]
    fn test_file_stem_encoding() {
        assert_eq!(encode_file_stem("notes.md"), "notes.md");
        assert_eq!(encode_file_stem("../x y"), "%2E.%2Fx%20y");
        assert_eq!(decode_file_stem("%2E.%2Fx%20y").unwrap(), "../x y");
        assert_eq!(decode_file_stem("café").unwrap(), "café");
        assert_eq!(
            decode_file_stem(&encode_file_stem("guía #1.md")).unwrap(),
            "guía #1.md"
        );
    }

    #[tokio::test]
    async fn test_file_store_put_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileChunkStore::new(dir.path().join("chunks")).await.unwrap();

        store.put(&stored("b/evil.md")).await.unwrap();
        store.put(&stored("a.md")).await.unwrap();
        store.put(&stored("a.md")).await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], stored("a.md"));
        assert_eq!(all[1].document_id, "b/evil.md");

        assert!(store.delete("a.md").await.unwrap());
        assert!(!store.delete("a.md").await.unwrap());
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileChunkStore::new(dir.path().to_path_buf()).await.unwrap();
        std::fs::write(dir.path().join("junk.json"), "{not json").unwrap();
        store.put(&stored("ok.md")).await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].document_id, "ok.md");
    }

    #[tokio::test]
    async fn test_file_store_skips_file_named_for_another_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileChunkStore::new(dir.path().to_path_buf()).await.unwrap();
        store.put(&stored("a.md")).await.unwrap();
        std::fs::copy(dir.path().join("a.md.json"), dir.path().join("copy.md.json")).unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].document_id, "a.md");
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryChunkStore::new();
        store.put(&stored("a.md")).await.unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 1);
        assert!(store.delete("a.md").await.unwrap());
        assert!(store.load_all().await.unwrap().is_empty());
    }
}
