//! Degradation taxonomy for the query pipeline.
//!
//! None of these values escape [`AnswerEngine::answer_query`](crate::engine::AnswerEngine::answer_query):
//! each stage logs the error at `warn` and converts it into a well-formed
//! fallback (unchanged ordering, apology, or "not initialized" answer).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The knowledge file was missing, unreadable, or had no chunks.
    #[error("knowledge base is empty or unavailable: {0}")]
    IngestionEmpty(String),

    /// A query arrived before any index was installed.
    #[error("retrieval unavailable: no index has been initialized")]
    RetrievalUnavailable,

    /// The rerank model failed or returned nothing usable.
    #[error("rerank degraded: {0}")]
    RerankDegraded(String),

    /// The answer model failed or returned an empty completion.
    #[error("generation failed: {0}")]
    GenerationFailure(String),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },
}

impl PipelineError {
    /// Wrap an `anyhow` error from a provider call into a stage error.
    pub fn rerank(err: anyhow::Error) -> Self {
        Self::RerankDegraded(format!("{:#}", err))
    }

    pub fn generation(err: anyhow::Error) -> Self {
        Self::GenerationFailure(format!("{:#}", err))
    }
}
