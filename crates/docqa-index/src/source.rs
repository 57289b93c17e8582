use async_trait::async_trait;
use docqa_core::{DocqaError, DocqaResult, DocumentId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Produces raw document text by id. Extraction from binary formats happens
/// upstream of this collaborator.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Every document id the source can currently serve, sorted.
    async fn list(&self) -> DocqaResult<Vec<DocumentId>>;

    /// Full text of one document. Unknown ids are [`DocqaError::NotFound`].
    async fn fetch(&self, id: &str) -> DocqaResult<String>;

    /// Human-readable location of a document, recorded on [`docqa_core::Document`].
    fn locate(&self, id: &str) -> String {
        id.to_string()
    }
}

/// Reads UTF-8 files from one directory; the file name is the document id.
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> DocqaResult<PathBuf> {
        if id.is_empty() || id == "." || id.contains("..") || id.contains(['/', '\\']) {
            return Err(DocqaError::NotFound(format!("document '{id}'")));
        }
        Ok(self.dir.join(id))
    }
}

#[async_trait]
impl DocumentSource for DirectorySource {
    async fn list(&self) -> DocqaResult<Vec<DocumentId>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn fetch(&self, id: &str) -> DocqaResult<String> {
        let path = self.path_for(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DocqaError::NotFound(format!("document '{id}'")));
            }
            Err(e) => return Err(e.into()),
        };
        String::from_utf8(bytes)
            .map_err(|_| DocqaError::InvalidDocument(format!("document '{id}' is not valid UTF-8")))
    }

    fn locate(&self, id: &str) -> String {
        self.dir.join(id).display().to_string()
    }
}

/// Documents held in memory, for tests and embedding callers.
#[derive(Default)]
pub struct InMemorySource {
    docs: RwLock<BTreeMap<DocumentId, String>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, id: impl Into<DocumentId>, text: impl Into<String>) -> Self {
        self.insert(id, text);
        self
    }

    /// Add or overwrite a document.
    pub fn insert(&self, id: impl Into<DocumentId>, text: impl Into<String>) {
        self.docs.write().insert(id.into(), text.into());
    }

    pub fn remove(&self, id: &str) -> bool {
        self.docs.write().remove(id).is_some()
    }
}

#[async_trait]
impl DocumentSource for InMemorySource {
    async fn list(&self) -> DocqaResult<Vec<DocumentId>> {
        Ok(self.docs.read().keys().cloned().collect())
    }

    async fn fetch(&self, id: &str) -> DocqaResult<String> {
        self.docs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| DocqaError::NotFound(format!("document '{id}'")))
    }

    fn locate(&self, id: &str) -> String {
        format!("memory:{id}")
    }
}
