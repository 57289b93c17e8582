use docqa_core::ChunkId;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// BM25 parameters.
const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Tokenize text into lowercase words, filtering tokens with length <= 1.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 1)
        .collect()
}

/// One lexical search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub chunk_id: ChunkId,
    pub score: f32,
    /// Number of distinct query terms present in the chunk.
    pub matched_terms: usize,
}

/// A BM25 inverted index over chunk tokens.
///
/// Postings are keyed by [`ChunkId`] and a per-document reverse map lets a
/// whole document be dropped without scanning the vocabulary.
#[derive(Debug, Clone, Default)]
pub struct LexicalIndex {
    /// term -> (chunk_id -> term_frequency)
    postings: HashMap<String, HashMap<ChunkId, u32>>,
    /// chunk_id -> token count
    chunk_lengths: HashMap<ChunkId, u32>,
    /// chunk_id -> distinct terms, for postings cleanup on removal
    chunk_terms: HashMap<ChunkId, Vec<String>>,
    /// document_id -> its indexed chunks
    by_document: HashMap<String, BTreeSet<ChunkId>>,
    total_length: u64,
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the postings for one chunk.
    pub fn index_chunk(&mut self, id: &ChunkId, tokens: &[String]) {
        if self.chunk_lengths.contains_key(id) {
            self.remove_chunk(id);
        }

        let mut term_freq: HashMap<&str, u32> = HashMap::new();
        for token in tokens {
            *term_freq.entry(token.as_str()).or_insert(0) += 1;
        }

        let mut terms = Vec::with_capacity(term_freq.len());
        for (term, freq) in term_freq {
            self.postings
                .entry(term.to_string())
                .or_default()
                .insert(id.clone(), freq);
            terms.push(term.to_string());
        }

        self.chunk_terms.insert(id.clone(), terms);
        self.chunk_lengths.insert(id.clone(), tokens.len() as u32);
        self.total_length += tokens.len() as u64;
        self.by_document
            .entry(id.document_id.clone())
            .or_default()
            .insert(id.clone());
    }

    /// Remove one chunk's postings. Returns false if it was not indexed.
    pub fn remove_chunk(&mut self, id: &ChunkId) -> bool {
        let Some(len) = self.chunk_lengths.remove(id) else {
            return false;
        };
        self.total_length = self.total_length.saturating_sub(u64::from(len));

        for term in self.chunk_terms.remove(id).unwrap_or_default() {
            if let Some(list) = self.postings.get_mut(&term) {
                list.remove(id);
                if list.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }

        if let Some(ids) = self.by_document.get_mut(&id.document_id) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_document.remove(&id.document_id);
            }
        }
        true
    }

    /// Remove every chunk of a document. Returns how many were removed.
    pub fn remove_document(&mut self, document_id: &str) -> usize {
        let ids = self.by_document.remove(document_id).unwrap_or_default();
        for id in &ids {
            // by_document entry is already gone; remove_chunk tolerates that.
            self.remove_chunk(id);
        }
        ids.len()
    }

    /// Rank chunks for the query tokens, returning up to `top_k` hits.
    ///
    /// ```text
    /// score = sum over distinct query terms of:
    ///   IDF(t) * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * dl / avgdl))
    /// IDF(t) = ln((N - df + 0.5) / (df + 0.5) + 1.0)
    /// ```
    ///
    /// Ties are broken by more matched query terms, then by lower chunk id.
    pub fn search(&self, query_tokens: &[String], top_k: usize) -> Vec<LexicalHit> {
        if self.chunk_lengths.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let terms: BTreeSet<&str> = query_tokens.iter().map(String::as_str).collect();
        let n = self.chunk_lengths.len() as f32;
        let avgdl = (self.total_length as f32 / n).max(1.0);
        let mut scores: HashMap<&ChunkId, (f32, usize)> = HashMap::new();

        for term in terms {
            let Some(list) = self.postings.get(term) else {
                continue;
            };
            let df = list.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            for (id, &tf) in list {
                let tf = tf as f32;
                let dl = self.chunk_lengths.get(id).copied().unwrap_or(0) as f32;
                let term_score = idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * dl / avgdl));
                let entry = scores.entry(id).or_insert((0.0, 0));
                entry.0 += term_score;
                entry.1 += 1;
            }
        }

        let mut hits: Vec<LexicalHit> = scores
            .into_iter()
            .map(|(id, (score, matched_terms))| LexicalHit {
                chunk_id: id.clone(),
                score,
                matched_terms,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.matched_terms.cmp(&a.matched_terms))
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(top_k);
        hits
    }

    /// Number of chunks currently indexed.
    pub fn chunk_count(&self) -> usize {
        self.chunk_lengths.len()
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.by_document.contains_key(document_id)
    }

    /// Number of distinct terms with at least one posting.
    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }

    /// Whether any posting references the given chunk.
    pub fn has_postings_for(&self, id: &ChunkId) -> bool {
        self.postings.values().any(|list| list.contains_key(id))
    }
}
