use docqa_core::{Chunk, ChunkId, DocqaError, DocqaResult};

use crate::bm25::tokenize;
use crate::config::ChunkingConfig;

/// A passage produced by the [`Chunker`] before the document store assigns
/// it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    /// Start byte offset in the original document.
    pub start: usize,
    /// End byte offset (exclusive) in the original document.
    pub end: usize,
    pub text: String,
}

impl ChunkDraft {
    pub fn into_chunk(self, document_id: &str, index: usize) -> Chunk {
        let tokens = tokenize(&self.text);
        Chunk {
            id: ChunkId::new(document_id, index),
            start: self.start,
            end: self.end,
            text: self.text,
            tokens,
            embedding: None,
        }
    }
}

/// Splits document text into overlapping, whitespace-token-sized windows.
///
/// Consecutive chunks share exactly `overlap_tokens` tokens. The first chunk
/// starts at byte 0, the last ends at the end of the text, and each chunk
/// ends where the token after its last one begins, so every byte of the input
/// belongs to at least one chunk.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size_tokens: usize,
    overlap_tokens: usize,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> DocqaResult<Self> {
        config.validate()?;
        Ok(Self {
            chunk_size_tokens: config.chunk_size_tokens,
            overlap_tokens: config.overlap_tokens,
        })
    }

    pub fn chunk(&self, text: &str) -> DocqaResult<Vec<ChunkDraft>> {
        if text.is_empty() {
            return Err(DocqaError::InvalidDocument("document is empty".to_string()));
        }

        let words = word_starts(text);
        if words.is_empty() {
            return Err(DocqaError::InvalidDocument(
                "document contains only whitespace".to_string(),
            ));
        }

        let n = words.len();
        let step = self.chunk_size_tokens - self.overlap_tokens;
        let mut drafts = Vec::with_capacity(n / step + 1);
        let mut first = 0;

        loop {
            let last = (first + self.chunk_size_tokens).min(n);
            let start = if first == 0 { 0 } else { words[first] };
            let end = if last == n { text.len() } else { words[last] };
            drafts.push(ChunkDraft {
                start,
                end,
                text: text[start..end].to_string(),
            });
            if last == n {
                break;
            }
            first += step;
        }

        Ok(drafts)
    }
}

/// Byte offsets where each whitespace-separated token begins.
fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            starts.push(i);
            in_word = true;
        }
    }
    starts
}

/// Rebuilds the original text from `(start, text)` spans sorted by start.
///
/// Overlapping bytes are taken once, from the earlier span.
pub fn reassemble<'a>(spans: impl IntoIterator<Item = (usize, &'a str)>) -> String {
    let mut out = String::new();
    let mut covered = 0;
    for (start, text) in spans {
        let end = start + text.len();
        if end <= covered {
            continue;
        }
        let skip = covered.saturating_sub(start);
        out.push_str(&text[skip..]);
        covered = end;
    }
    out
}
