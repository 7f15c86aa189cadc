//! The query-side orchestrator.
//!
//! [`AnswerEngine`] owns the active [`KnowledgeIndex`] snapshot and runs
//! retrieve → rerank → top-N → generate for each query. Snapshots are
//! immutable: [`AnswerEngine::initialize`] builds a complete new one
//! outside the lock and swaps it in with a single write, so in-flight
//! queries keep the snapshot they started with. Only one rebuild runs at
//! a time.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use sitesage_core::index::KnowledgeIndex;
use sitesage_core::models::{Chunk, KnowledgeBase, QueryResult};
use sitesage_core::retrieve::{retrieve, Candidate, RetrievalMode, RetrievalParams};

use crate::answer::{AnswerGenerator, NOT_INITIALIZED};
use crate::config::Config;
use crate::embedding::{create_embedder, embed_batched, embed_query, Embedder};
use crate::error::PipelineError;
use crate::ingest::load_knowledge;
use crate::llm::create_chat_model;
use crate::rerank::Reranker;

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub retrieval: RetrievalParams,
    /// Reranked candidates passed to the answer stage.
    pub context_limit: usize,
    pub batch_size: usize,
    /// Bound on the query embedding, and on each batch during a rebuild.
    pub embed_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retrieval: RetrievalParams::default(),
            context_limit: 4,
            batch_size: 64,
            embed_timeout: Duration::from_secs(30),
        }
    }
}

/// An owned retrieval result, for `sage search` and other callers that
/// outlive the snapshot borrow.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub dense_rank: Option<usize>,
    pub sparse_rank: Option<usize>,
    pub fused_score: f64,
}

impl From<&Candidate<'_>> for SearchHit {
    fn from(c: &Candidate<'_>) -> Self {
        let mut chunk = c.chunk.clone();
        chunk.embedding = Vec::new();
        Self {
            chunk,
            dense_rank: c.dense_rank,
            sparse_rank: c.sparse_rank,
            fused_score: c.fused_score,
        }
    }
}

pub struct AnswerEngine {
    embedder: Arc<dyn Embedder>,
    reranker: Reranker,
    generator: AnswerGenerator,
    settings: EngineSettings,
    active: RwLock<Option<Arc<KnowledgeIndex>>>,
    rebuild: Mutex<()>,
}

impl AnswerEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        reranker: Reranker,
        generator: AnswerGenerator,
        settings: EngineSettings,
    ) -> Self {
        Self {
            embedder,
            reranker,
            generator,
            settings,
            active: RwLock::new(None),
            rebuild: Mutex::new(()),
        }
    }

    /// Wire up the configured embedding and chat providers. No index is
    /// loaded yet.
    pub fn from_config(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let reranker = Reranker::new(
            create_chat_model(&config.rerank)?,
            config.rerank.timeout(),
        );
        let generator = AnswerGenerator::new(
            create_chat_model(&config.generation)?,
            config.generation.timeout(),
            config.assistant.company_name.clone(),
        );
        let settings = EngineSettings {
            retrieval: config.retrieval.params(),
            context_limit: config.retrieval.context_limit,
            batch_size: config.embedding.batch_size,
            embed_timeout: Duration::from_secs(config.embedding.timeout_secs),
        };
        Ok(Self::new(embedder, reranker, generator, settings))
    }

    pub async fn is_ready(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// The active snapshot, if any.
    pub async fn snapshot(&self) -> Option<Arc<KnowledgeIndex>> {
        self.active.read().await.clone()
    }

    /// Embed and index `kb.chunks`, then make the result the active
    /// snapshot. On failure the previous snapshot (if any) stays active.
    pub async fn initialize(&self, kb: &KnowledgeBase) -> bool {
        let _guard = self.rebuild.lock().await;

        match self.build_index(kb).await {
            Ok(index) => {
                let count = index.chunk_count();
                *self.active.write().await = Some(Arc::new(index));
                info!(chunks = count, model = self.embedder.model_name(), "knowledge index ready");
                true
            }
            Err(err) => {
                warn!(error = %err, "knowledge index not built");
                false
            }
        }
    }

    /// Load the knowledge file at `path` and [`initialize`](Self::initialize) from it.
    pub async fn initialize_from_path(&self, path: &Path) -> bool {
        match load_knowledge(path) {
            Ok(kb) => self.initialize(&kb).await,
            Err(err) => {
                warn!(error = %err, "knowledge index not built");
                false
            }
        }
    }

    async fn build_index(&self, kb: &KnowledgeBase) -> Result<KnowledgeIndex> {
        if kb.chunks.is_empty() {
            return Err(PipelineError::IngestionEmpty("no chunks to index".to_string()).into());
        }

        let texts: Vec<String> = kb.chunks.iter().map(|c| c.content.clone()).collect();
        let batches = texts.len().div_ceil(self.settings.batch_size.max(1));
        let budget = self
            .settings
            .embed_timeout
            .saturating_mul(u32::try_from(batches).unwrap_or(u32::MAX));
        let vectors = tokio::time::timeout(
            budget,
            embed_batched(self.embedder.as_ref(), &texts, self.settings.batch_size),
        )
        .await
        .map_err(|_| PipelineError::Timeout {
            stage: "embedding",
            secs: budget.as_secs(),
        })??;

        let chunks = kb
            .chunks
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(mut chunk, embedding)| {
                chunk.embedding = embedding;
                chunk
            })
            .collect();

        Ok(KnowledgeIndex::build(chunks)?)
    }

    /// Answer `query` from the active snapshot. Never fails: every stage
    /// degrades to a well-formed result.
    pub async fn answer_query(&self, query: &str) -> QueryResult {
        let Some(index) = self.snapshot().await else {
            warn!(error = %PipelineError::RetrievalUnavailable, "answering without an index");
            return QueryResult::unsourced(NOT_INITIALIZED);
        };

        let candidates = self.candidates(&index, query, RetrievalMode::Hybrid).await;
        if candidates.is_empty() {
            info!("no candidates retrieved");
            return QueryResult::unsourced(NOT_INITIALIZED);
        }

        let mut ranked = self.reranker.rerank(query, candidates).await;
        ranked.truncate(self.settings.context_limit);
        self.generator.answer(query, &ranked).await
    }

    /// Retrieval only, without reranking or generation. `None` when no
    /// index is active.
    pub async fn search(&self, query: &str, mode: RetrievalMode) -> Option<Vec<SearchHit>> {
        let index = self.snapshot().await?;
        let candidates = self.candidates(&index, query, mode).await;
        Some(candidates.iter().map(SearchHit::from).collect())
    }

    async fn candidates<'a>(
        &self,
        index: &'a KnowledgeIndex,
        query: &str,
        mode: RetrievalMode,
    ) -> Vec<Candidate<'a>> {
        if query.trim().is_empty() {
            return Vec::new();
        }

        let query_vec = if mode.uses_dense() {
            let timeout = self.settings.embed_timeout;
            match tokio::time::timeout(timeout, embed_query(self.embedder.as_ref(), query)).await {
                Ok(Ok(v)) => Some(v),
                Ok(Err(err)) => {
                    warn!(error = %format!("{:#}", err), "query embedding failed, using keyword results only");
                    None
                }
                Err(_) => {
                    let err = PipelineError::Timeout {
                        stage: "embedding",
                        secs: timeout.as_secs(),
                    };
                    warn!(error = %err, "using keyword results only");
                    None
                }
            }
        } else {
            None
        };

        retrieve(index, query, query_vec.as_deref(), mode, &self.settings.retrieval)
    }
}
