//! Dense and lexical indexes over one chunk set.
//!
//! A [`KnowledgeIndex`] is an immutable snapshot: it owns the chunks, a
//! brute-force cosine [`DenseIndex`] over their embeddings, and a BM25
//! [`SparseIndex`] over their content. It is built wholesale from a
//! complete chunk set and never mutated afterwards; a rebuild produces a
//! new snapshot.
//!
//! # BM25
//!
//! ```text
//! score(q, d) = Σ idf(t) × tf(t,d) × (k1 + 1) / (tf(t,d) + k1 × (1 − b + b × |d| / avgdl))
//! idf(t)      = ln(1 + (N − n(t) + 0.5) / (n(t) + 0.5))
//! ```
//!
//! with `k1 = 1.5`, `b = 0.75`. Documents sharing no term with the query
//! score zero and are never returned.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::embedding::cosine_similarity;
use crate::error::IndexError;
use crate::models::Chunk;

const BM25_K1: f64 = 1.5;
const BM25_B: f64 = 0.75;

/// A hit from either index: position of the chunk in the snapshot and
/// the raw backend score (cosine similarity or BM25).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredHit {
    pub doc: usize,
    pub score: f64,
}

/// Lowercase alphanumeric terms of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Sort hits best-first; equal scores keep insertion (chunk) order.
fn rank_hits(mut hits: Vec<ScoredHit>, k: usize) -> Vec<ScoredHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.doc.cmp(&b.doc))
    });
    hits.truncate(k);
    hits
}

// ============ Dense ============

/// Brute-force nearest-neighbour search over chunk embeddings.
#[derive(Debug, Clone)]
pub struct DenseIndex {
    dims: usize,
    vectors: Vec<Vec<f32>>,
}

impl DenseIndex {
    pub fn build(chunks: &[Chunk]) -> Result<Self, IndexError> {
        let first = chunks.first().ok_or(IndexError::EmptyCorpus)?;
        let dims = first.embedding.len();

        for chunk in chunks {
            if chunk.embedding.len() != dims || dims == 0 {
                return Err(IndexError::DimensionMismatch {
                    chunk_id: chunk.id.clone(),
                    expected: dims,
                    actual: chunk.embedding.len(),
                });
            }
        }

        Ok(Self {
            dims,
            vectors: chunks.iter().map(|c| c.embedding.clone()).collect(),
        })
    }

    /// Top-`k` chunks by cosine similarity to `query_vec`.
    ///
    /// A query of the wrong dimension matches nothing.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Vec<ScoredHit> {
        if query_vec.len() != self.dims {
            return Vec::new();
        }
        let hits = self
            .vectors
            .iter()
            .enumerate()
            .map(|(doc, v)| ScoredHit {
                doc,
                score: cosine_similarity(query_vec, v) as f64,
            })
            .collect();
        rank_hits(hits, k)
    }
}

// ============ Sparse ============

/// In-memory BM25 index.
#[derive(Debug, Clone)]
pub struct SparseIndex {
    /// term → (doc, term frequency)
    postings: HashMap<String, Vec<(usize, u32)>>,
    doc_lens: Vec<u32>,
    avg_len: f64,
}

impl SparseIndex {
    pub fn build(chunks: &[Chunk]) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }

        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();
        let mut doc_lens = Vec::with_capacity(chunks.len());

        for (doc, chunk) in chunks.iter().enumerate() {
            let terms = tokenize(&chunk.content);
            doc_lens.push(terms.len() as u32);

            let mut tf: HashMap<String, u32> = HashMap::new();
            for term in terms {
                *tf.entry(term).or_default() += 1;
            }
            for (term, count) in tf {
                postings.entry(term).or_default().push((doc, count));
            }
        }

        let total: u64 = doc_lens.iter().map(|&l| l as u64).sum();
        let avg_len = (total as f64 / doc_lens.len() as f64).max(1.0);

        Ok(Self {
            postings,
            doc_lens,
            avg_len,
        })
    }

    fn idf(&self, doc_freq: usize) -> f64 {
        let n = self.doc_lens.len() as f64;
        let df = doc_freq as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Top-`k` chunks by BM25 score. Zero-score chunks are omitted.
    pub fn search(&self, query: &str, k: usize) -> Vec<ScoredHit> {
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();

        let mut scores: HashMap<usize, f64> = HashMap::new();
        for term in &terms {
            let Some(list) = self.postings.get(term) else {
                continue;
            };
            let idf = self.idf(list.len());
            for &(doc, tf) in list {
                let tf = tf as f64;
                let len_norm = 1.0 - BM25_B + BM25_B * self.doc_lens[doc] as f64 / self.avg_len;
                let term_score = idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * len_norm);
                *scores.entry(doc).or_default() += term_score;
            }
        }

        let hits = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .map(|(doc, score)| ScoredHit { doc, score })
            .collect();
        rank_hits(hits, k)
    }
}

// ============ Snapshot ============

/// Immutable chunk set plus both indexes.
#[derive(Debug, Clone)]
pub struct KnowledgeIndex {
    chunks: Vec<Chunk>,
    dense: DenseIndex,
    sparse: SparseIndex,
}

impl KnowledgeIndex {
    /// Build both indexes. Every chunk must carry an embedding of the
    /// same dimension.
    pub fn build(chunks: Vec<Chunk>) -> Result<Self, IndexError> {
        let dense = DenseIndex::build(&chunks)?;
        let sparse = SparseIndex::build(&chunks)?;
        Ok(Self {
            chunks,
            dense,
            sparse,
        })
    }

    pub fn chunk(&self, doc: usize) -> Option<&Chunk> {
        self.chunks.get(doc)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn dense(&self) -> &DenseIndex {
        &self.dense
    }

    pub fn sparse(&self) -> &SparseIndex {
        &self.sparse
    }
}
