//! Similarity-driven sentence chunker.
//!
//! Splits a page's text into [`Chunk`]s of semantically related sentences.
//! A sentence is one non-empty line of extracted text. Neighbouring
//! sentences stay together while their embeddings are similar and the
//! chunk stays under `max_chars`; tiny buffers are force-merged so no
//! orphaned fragments reach the index.
//!
//! # Algorithm
//!
//! 1. Split text into trimmed, non-empty lines.
//! 2. Embed every sentence independently (done by the caller).
//! 3. Seed a buffer with the first sentence.
//! 4. For each following sentence `s[i]`, with `sim = cos(e[i-1], e[i])`
//!    and `merged` the buffer length after appending `s[i]`:
//!    - force-merge when the buffer is under `min_chunk_chars` and
//!      `merged <= max_chars`;
//!    - merge when `sim >= similarity_threshold` and `merged < max_chars`;
//!    - otherwise flush the buffer as a chunk and start a new one.
//! 5. Flush whatever remains, however short.
//!
//! Lengths are counted in `char`s over the joined content (sentences are
//! joined by a single space). A multi-sentence chunk therefore never
//! exceeds `max_chars`; only a lone oversized sentence can.
//!
//! Chunk ids come from an [`IdSequence`] shared across every page of one
//! ingestion run, so ids are unique and strictly increasing corpus-wide.

use std::ops::Range;

use crate::category::CategoryRules;
use crate::embedding::cosine_similarity;
use crate::error::IndexError;
use crate::models::{Chunk, Page};

pub const SIMILARITY_THRESHOLD: f32 = 0.6;
pub const MIN_CHUNK_CHARS: usize = 250;
pub const MAX_CHARS: usize = 1500;

/// Chunk id prefix; ids look like `chunk_0`, `chunk_1`, …
pub const CHUNK_ID_PREFIX: &str = "chunk_";

/// Chunking tuning parameters, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkingParams {
    pub similarity_threshold: f32,
    pub min_chunk_chars: usize,
    pub max_chars: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            similarity_threshold: SIMILARITY_THRESHOLD,
            min_chunk_chars: MIN_CHUNK_CHARS,
            max_chars: MAX_CHARS,
        }
    }
}

/// Process-wide chunk id allocator for one ingestion run.
///
/// Never reset between pages.
#[derive(Debug, Default)]
pub struct IdSequence {
    next: u64,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("{}{}", CHUNK_ID_PREFIX, self.next);
        self.next += 1;
        id
    }

    /// Number of ids handed out so far (when started at zero).
    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// Numeric part of a chunk id, if it has the `chunk_<n>` shape.
pub fn chunk_ordinal(id: &str) -> Option<u64> {
    id.strip_prefix(CHUNK_ID_PREFIX)?.parse().ok()
}

/// Split extracted text into sentences: trimmed, non-empty lines.
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Group consecutive sentences into chunk ranges.
///
/// `embeddings[i]` must be the embedding of `sentences[i]`. The returned
/// ranges are contiguous, non-empty, and cover `0..sentences.len()`
/// exactly.
pub fn group_sentences(
    sentences: &[&str],
    embeddings: &[Vec<f32>],
    params: &ChunkingParams,
) -> Result<Vec<Range<usize>>, IndexError> {
    if embeddings.len() != sentences.len() {
        return Err(IndexError::MissingEmbeddings {
            expected: sentences.len(),
            actual: embeddings.len(),
        });
    }
    if sentences.is_empty() {
        return Ok(Vec::new());
    }

    let mut groups = Vec::new();
    let mut start = 0;
    let mut buf_chars = char_len(sentences[0]);

    for i in 1..sentences.len() {
        let sentence_chars = char_len(sentences[i]);
        let merged = buf_chars + 1 + sentence_chars;
        let sim = cosine_similarity(&embeddings[i - 1], &embeddings[i]);

        let force = buf_chars < params.min_chunk_chars && merged <= params.max_chars;
        let similar = sim >= params.similarity_threshold && merged < params.max_chars;

        if force || similar {
            buf_chars = merged;
        } else {
            groups.push(start..i);
            start = i;
            buf_chars = sentence_chars;
        }
    }
    groups.push(start..sentences.len());

    Ok(groups)
}

/// Chunk one page.
///
/// `sentences` must come from [`split_sentences`] on `page.text` and
/// `embeddings` must be their embeddings, in order. Pages without
/// sentences yield no chunks.
pub fn chunk_page(
    page: &Page,
    sentences: &[&str],
    embeddings: &[Vec<f32>],
    rules: &CategoryRules,
    params: &ChunkingParams,
    ids: &mut IdSequence,
) -> Result<Vec<Chunk>, IndexError> {
    let groups = group_sentences(sentences, embeddings, params)?;
    if groups.is_empty() {
        return Ok(Vec::new());
    }

    let category = rules.categorize(&page.url);

    Ok(groups
        .into_iter()
        .map(|range| Chunk {
            id: ids.next_id(),
            source_url: page.url.clone(),
            category: category.clone(),
            title: page.title.clone(),
            content: sentences[range].join(" "),
            embedding: Vec::new(),
        })
        .collect())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
