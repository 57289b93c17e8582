use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use docqa_core::{Chunk, ChunkId, DocqaError, DocqaResult, Document, DocumentId, DocumentStatus};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::chunker::Chunker;
use crate::context::IndexContext;
use crate::embedding::EmbeddingProvider;
use crate::persist::{ChunkStore, StoredChunks};
use crate::source::DocumentSource;

/// Final state of one preprocessing run as seen by one caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessOutcome {
    pub document_id: DocumentId,
    pub status: DocumentStatus,
    pub chunk_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True when this caller joined a run another request had started.
    pub coalesced: bool,
}

type JobReceiver = watch::Receiver<Option<PreprocessOutcome>>;

/// Owns document identity and lifecycle and drives the
/// chunk -> embed -> index pipeline.
///
/// At most one pipeline runs per document id. The job map is keyed by id, so
/// unrelated documents preprocess in parallel; a second request for a running
/// id subscribes to the running job instead of starting another.
pub struct DocumentStore {
    documents: RwLock<BTreeMap<DocumentId, Document>>,
    jobs: parking_lot::Mutex<HashMap<DocumentId, JobReceiver>>,
    source: Arc<dyn DocumentSource>,
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<IndexContext>,
    chunk_store: Arc<dyn ChunkStore>,
    batch_size: usize,
}

impl DocumentStore {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<IndexContext>,
        chunk_store: Arc<dyn ChunkStore>,
    ) -> Self {
        Self {
            documents: RwLock::new(BTreeMap::new()),
            jobs: parking_lot::Mutex::new(HashMap::new()),
            source,
            chunker,
            embedder,
            index,
            chunk_store,
            batch_size: 32,
        }
    }

    /// Number of texts sent to the embedder per call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn index(&self) -> Arc<IndexContext> {
        Arc::clone(&self.index)
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&self.embedder)
    }

    /// Preprocess one document and wait for the run to finish.
    ///
    /// The pipeline runs in its own task, so dropping this future does not
    /// abandon a half-finished run. Pipeline failures are reported in the
    /// outcome (`status: failed`); only an id the store and source have never
    /// heard of is an error.
    pub async fn preprocess(self: &Arc<Self>, id: &str) -> DocqaResult<PreprocessOutcome> {
        self.ensure_known(id).await?;

        let (mut rx, coalesced) = {
            let mut jobs = self.jobs.lock();
            match jobs.get(id) {
                Some(rx) => (rx.clone(), true),
                None => {
                    let (tx, rx) = watch::channel(None);
                    jobs.insert(id.to_string(), rx.clone());
                    let store = Arc::clone(self);
                    let id = id.to_string();
                    tokio::spawn(async move {
                        let guard = JobGuard {
                            store: Arc::clone(&store),
                            id: id.clone(),
                        };
                        let pipeline = {
                            let store = Arc::clone(&store);
                            let id = id.clone();
                            tokio::spawn(async move { store.run_pipeline(&id).await })
                        };
                        let outcome = match pipeline.await {
                            Ok(outcome) => outcome,
                            Err(e) => store.abandon(&id, &e.to_string()).await,
                        };
                        drop(guard);
                        let _ = tx.send(Some(outcome));
                    });
                    (rx, false)
                }
            }
        };

        if coalesced {
            debug!(document_id = id, "Joining running preprocessing job");
        }

        let finished = rx.wait_for(Option::is_some).await.ok().and_then(|o| o.clone());
        let mut outcome = finished.unwrap_or_else(|| PreprocessOutcome {
            document_id: id.to_string(),
            status: DocumentStatus::Failed,
            chunk_count: 0,
            error: Some("preprocessing task ended without reporting".to_string()),
            coalesced,
        });
        outcome.coalesced = coalesced;
        Ok(outcome)
    }

    /// Preprocess several documents concurrently. An empty list means every
    /// source document that is not already ready.
    ///
    /// Unknown ids are rejected before any run starts.
    pub async fn preprocess_many(
        self: &Arc<Self>,
        ids: &[DocumentId],
    ) -> DocqaResult<Vec<PreprocessOutcome>> {
        let ids: Vec<DocumentId> = if ids.is_empty() {
            self.list()
                .await?
                .into_iter()
                .filter(|d| d.status != DocumentStatus::Ready)
                .map(|d| d.id)
                .collect()
        } else {
            for id in ids {
                self.ensure_known(id).await?;
            }
            ids.to_vec()
        };

        join_all(ids.iter().map(|id| self.preprocess(id)))
            .await
            .into_iter()
            .collect()
    }

    /// All known documents, sorted by id. Source documents seen for the first
    /// time are registered as `pending`.
    pub async fn list(&self) -> DocqaResult<Vec<Document>> {
        let source_ids = self.source.list().await?;
        let mut docs = self.documents.write().await;
        for id in source_ids {
            if !docs.contains_key(&id) {
                let doc = Document::new(id.clone(), self.source.locate(&id));
                docs.insert(id, doc);
            }
        }
        Ok(docs.values().cloned().collect())
    }

    pub async fn get(&self, id: &str) -> DocqaResult<Document> {
        self.documents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DocqaError::NotFound(format!("document '{id}'")))
    }

    /// Forget a document and drop its postings, vectors and persisted chunks.
    pub async fn delete(&self, id: &str) -> DocqaResult<Document> {
        if self.jobs.lock().contains_key(id) {
            return Err(DocqaError::InvalidDocument(format!(
                "document '{id}' is being preprocessed"
            )));
        }
        let doc = self
            .documents
            .write()
            .await
            .remove(id)
            .ok_or_else(|| DocqaError::NotFound(format!("document '{id}'")))?;

        let removed = self.index.remove_document(id).await;
        self.chunk_store.delete(id).await?;
        info!(document_id = id, chunks = removed, "Deleted document");
        Ok(doc)
    }

    /// Reload persisted chunks into the index. Documents whose vectors no
    /// longer match the configured embedder are marked failed.
    ///
    /// Returns how many documents came back ready.
    pub async fn restore(&self) -> DocqaResult<usize> {
        let stored = self.chunk_store.load_all().await?;
        let mut restored = 0;

        for entry in stored {
            let id = entry.document_id.clone();
            let mut doc = Document::new(id.clone(), self.source.locate(&id));

            let stale = entry.model_id != self.embedder.model_id()
                || entry.chunks.iter().any(|c| {
                    c.embedding
                        .as_ref()
                        .map_or(true, |v| v.len() != self.index.dimension())
                });

            if stale {
                warn!(document_id = %id, model = %entry.model_id, "Persisted chunks do not match embedder");
                doc.mark_failed("embedder changed, re-preprocess required");
            } else {
                match self.index.replace_document(&id, entry.chunks).await {
                    Ok(chunk_ids) => {
                        doc.mark_ready(chunk_ids);
                        restored += 1;
                    }
                    Err(e) => {
                        warn!(document_id = %id, error = %e, "Failed to restore document");
                        doc.mark_failed(e.to_string());
                    }
                }
            }
            self.documents.write().await.insert(id, doc);
        }

        info!(documents = restored, "Restored persisted chunks");
        Ok(restored)
    }

    async fn ensure_known(&self, id: &str) -> DocqaResult<()> {
        if self.documents.read().await.contains_key(id) {
            return Ok(());
        }
        if self.source.list().await?.iter().any(|s| s == id) {
            return Ok(());
        }
        Err(DocqaError::NotFound(format!("document '{id}'")))
    }

    async fn run_pipeline(&self, id: &str) -> PreprocessOutcome {
        {
            let mut docs = self.documents.write().await;
            docs.entry(id.to_string())
                .or_insert_with(|| Document::new(id, self.source.locate(id)))
                .begin_processing();
        }
        info!(document_id = id, "Preprocessing document");
        let started = Instant::now();

        let result = self.build_and_swap(id).await;
        if result.is_err() {
            // Postings may only reference ready documents.
            self.index.remove_document(id).await;
            if let Err(e) = self.chunk_store.delete(id).await {
                warn!(document_id = id, error = %e, "Failed to purge persisted chunks");
            }
        }

        let mut docs = self.documents.write().await;
        let doc = docs
            .entry(id.to_string())
            .or_insert_with(|| Document::new(id, self.source.locate(id)));
        match result {
            Ok(chunk_ids) => {
                info!(
                    document_id = id,
                    chunks = chunk_ids.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Document ready"
                );
                doc.mark_ready(chunk_ids);
            }
            Err(e) => {
                warn!(document_id = id, error = %e, "Preprocessing failed");
                doc.mark_failed(e.to_string());
            }
        }
        outcome_of(doc)
    }

    /// Clean up after a pipeline task that panicked or was cancelled: the
    /// document ends `failed` with nothing indexed or persisted.
    async fn abandon(&self, id: &str, reason: &str) -> PreprocessOutcome {
        warn!(document_id = id, reason, "Preprocessing task aborted");
        self.index.remove_document(id).await;
        if let Err(e) = self.chunk_store.delete(id).await {
            warn!(document_id = id, error = %e, "Failed to purge persisted chunks");
        }

        let mut docs = self.documents.write().await;
        let doc = docs
            .entry(id.to_string())
            .or_insert_with(|| Document::new(id, self.source.locate(id)));
        doc.mark_failed(format!("preprocessing aborted: {reason}"));
        outcome_of(doc)
    }

    async fn build_and_swap(&self, id: &str) -> DocqaResult<Vec<ChunkId>> {
        let text = self.source.fetch(id).await?;
        let drafts = self.chunker.chunk(&text)?;

        if self.embedder.dimension() != self.index.dimension() {
            return Err(DocqaError::DimensionMismatch {
                expected: self.index.dimension(),
                actual: self.embedder.dimension(),
            });
        }

        let texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embedder.embed_batch(batch).await?);
        }
        if vectors.len() != drafts.len() {
            return Err(DocqaError::EmbeddingUnavailable(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                drafts.len()
            )));
        }

        let chunks: Vec<Chunk> = drafts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (draft, vector))| {
                let mut chunk = draft.into_chunk(id, i);
                chunk.embedding = Some(vector);
                chunk
            })
            .collect();
        debug!(document_id = id, chunks = chunks.len(), "Embedded chunks");

        let stored = StoredChunks {
            document_id: id.to_string(),
            model_id: self.embedder.model_id().to_string(),
            chunks: chunks.clone(),
        };
        let ids = self.index.replace_document(id, chunks).await?;
        self.chunk_store.put(&stored).await?;
        Ok(ids)
    }
}

/// Releases a document's job slot however the job task ends.
struct JobGuard {
    store: Arc<DocumentStore>,
    id: DocumentId,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.store.jobs.lock().remove(&self.id);
    }
}

fn outcome_of(doc: &Document) -> PreprocessOutcome {
    PreprocessOutcome {
        document_id: doc.id.clone(),
        status: doc.status,
        chunk_count: doc.chunk_ids.len(),
        error: doc.error.clone(),
        coalesced: false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;
    use crate::embedding::LocalEmbedding;
    use crate::persist::InMemoryChunkStore;
    use crate::source::InMemorySource;
    use crate::vector::Metric;

    fn store_with(source: InMemorySource, chunk_size: usize) -> Arc<DocumentStore> {
        let chunker = Chunker::new(&ChunkingConfig {
            chunk_size_tokens: chunk_size,
            overlap_tokens: 1,
        })
        .unwrap();
        Arc::new(DocumentStore::new(
            Arc::new(source),
            chunker,
            Arc::new(LocalEmbedding::new(32)),
            Arc::new(IndexContext::new(32, Metric::Cosine)),
            Arc::new(InMemoryChunkStore::new()),
        ))
    }

    #[tokio::test]
    async fn test_preprocess_marks_ready() {
        let store = store_with(
            InMemorySource::new().with_document("a.md", "one two three four five six"),
            3,
        );
        let outcome = store.preprocess("a.md").await.unwrap();
        assert_eq!(outcome.status, DocumentStatus::Ready);
        assert_eq!(outcome.chunk_count, 3);
        assert!(!outcome.coalesced);

        let doc = store.get("a.md").await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Ready);
        assert_eq!(doc.chunk_ids[2], ChunkId::new("a.md", 2));
        assert_eq!(store.index().chunk_count().await, 3);
    }

    #[tokio::test]
    async fn test_unknown_document_is_not_found() {
        let store = store_with(InMemorySource::new(), 3);
        assert!(matches!(
            store.preprocess("nope.md").await,
            Err(DocqaError::NotFound(_))
        ));
        assert!(matches!(store.get("nope.md").await, Err(DocqaError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_blank_document_fails_and_purges() {
        let source = Arc::new(InMemorySource::new().with_document("a.md", "alpha beta gamma"));
        let store = Arc::new(DocumentStore::new(
            source.clone(),
            Chunker::new(&ChunkingConfig::default()).unwrap(),
            Arc::new(LocalEmbedding::new(32)),
            Arc::new(IndexContext::new(32, Metric::Cosine)),
            Arc::new(InMemoryChunkStore::new()),
        ));
        store.preprocess("a.md").await.unwrap();
        assert_eq!(store.index().chunk_count().await, 1);

        source.insert("a.md", "   ");
        let outcome = store.preprocess("a.md").await.unwrap();
        assert_eq!(outcome.status, DocumentStatus::Failed);
        assert!(outcome.error.is_some());
        assert_eq!(store.index().chunk_count().await, 0);
        assert!(store.get("a.md").await.unwrap().chunk_ids.is_empty());
    }

    #[tokio::test]
    async fn test_list_registers_pending_and_delete() {
        let store = store_with(
            InMemorySource::new()
                .with_document("a.md", "alpha")
                .with_document("b.md", "beta"),
            3,
        );
        let docs = store.list().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.status == DocumentStatus::Pending));

        store.preprocess("a.md").await.unwrap();
        let deleted = store.delete("a.md").await.unwrap();
        assert_eq!(deleted.status, DocumentStatus::Ready);
        assert_eq!(store.index().chunk_count().await, 0);
        assert!(matches!(store.delete("zzz").await, Err(DocqaError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_preprocess_many_empty_means_not_ready() {
        let store = store_with(
            InMemorySource::new()
                .with_document("a.md", "alpha words")
                .with_document("b.md", "beta words"),
            3,
        );
        store.preprocess("a.md").await.unwrap();

        let outcomes = store.preprocess_many(&[]).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].document_id, "b.md");
        assert_eq!(outcomes[0].status, DocumentStatus::Ready);
    }
}
