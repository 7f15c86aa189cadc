use thiserror::Error;

/// Failures while building a [`KnowledgeIndex`](crate::index::KnowledgeIndex).
///
/// Query-time operations never fail; only index construction does.
#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    #[error("cannot build an index from an empty chunk set")]
    EmptyCorpus,

    #[error("expected {expected} embeddings, got {actual}")]
    MissingEmbeddings { expected: usize, actual: usize },

    #[error("chunk {chunk_id} has a {actual}-dimension embedding, expected {expected}")]
    DimensionMismatch {
        chunk_id: String,
        expected: usize,
        actual: usize,
    },
}
