//! Rerank stage: asks a chat model to reorder retrieval candidates.
//!
//! Any failure (provider error, timeout, or a reply with no usable
//! numbers) degrades to the input order, logged at `warn`.

use std::sync::Arc;
use std::time::Duration;

use sitesage_core::rerank::{apply_ranking, parse_ranking, rerank_prompt};
use sitesage_core::retrieve::Candidate;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::ChatModel;

pub struct Reranker {
    model: Arc<dyn ChatModel>,
    timeout: Duration,
}

impl Reranker {
    pub fn new(model: Arc<dyn ChatModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// Reorder `candidates` by relevance to `query`.
    ///
    /// Always returns a permutation of the input.
    pub async fn rerank<'a>(&self, query: &str, candidates: Vec<Candidate<'a>>) -> Vec<Candidate<'a>> {
        if candidates.len() < 2 {
            return candidates;
        }

        match self.ranking(query, &candidates).await {
            Ok(ranking) => {
                debug!(?ranking, "reranked {} candidates", candidates.len());
                apply_ranking(candidates, &ranking)
            }
            Err(err) => {
                warn!(error = %err, "keeping retrieval order");
                candidates
            }
        }
    }

    async fn ranking(&self, query: &str, candidates: &[Candidate<'_>]) -> Result<Vec<usize>, PipelineError> {
        let passages: Vec<&str> = candidates.iter().map(|c| c.chunk.content.as_str()).collect();
        let prompt = rerank_prompt(query, &passages);

        let reply = tokio::time::timeout(self.timeout, self.model.complete(&prompt))
            .await
            .map_err(|_| PipelineError::Timeout {
                stage: "rerank",
                secs: self.timeout.as_secs(),
            })?
            .map_err(PipelineError::rerank)?;

        let ranking = parse_ranking(&reply, candidates.len());
        if ranking.is_empty() {
            return Err(PipelineError::RerankDegraded(format!(
                "no candidate numbers in reply {:?}",
                reply
            )));
        }
        Ok(ranking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sitesage_core::models::Chunk;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Reply {
        Text(&'static str),
        Fail,
        Hang,
    }

    struct ScriptedModel {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Reply::Text(t) => Ok(t.to_string()),
                Reply::Fail => anyhow::bail!("503 from provider"),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
            }
        }
    }

    fn chunks(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk {
                id: format!("chunk_{i}"),
                source_url: format!("https://acme.com/{i}"),
                category: "other".to_string(),
                title: String::new(),
                content: format!("passage {i}"),
                embedding: Vec::new(),
            })
            .collect()
    }

    fn candidates(chunks: &[Chunk]) -> Vec<Candidate<'_>> {
        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| Candidate {
                chunk,
                dense_rank: Some(i + 1),
                sparse_rank: None,
                fused_score: 1.0 / (i + 1) as f64,
            })
            .collect()
    }

    fn ids(candidates: &[Candidate<'_>]) -> Vec<String> {
        candidates.iter().map(|c| c.chunk.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_applies_model_ranking() {
        let chunks = chunks(3);
        let reranker = Reranker::new(ScriptedModel::new(Reply::Text("3, 1, 2")), Duration::from_secs(5));
        let out = reranker.rerank("q", candidates(&chunks)).await;
        assert_eq!(ids(&out), vec!["chunk_2", "chunk_0", "chunk_1"]);
    }

    #[tokio::test]
    async fn test_partial_ranking_appends_rest() {
        let chunks = chunks(4);
        let reranker = Reranker::new(ScriptedModel::new(Reply::Text("4")), Duration::from_secs(5));
        let out = reranker.rerank("q", candidates(&chunks)).await;
        assert_eq!(ids(&out), vec!["chunk_3", "chunk_0", "chunk_1", "chunk_2"]);
    }

    #[tokio::test]
    async fn test_error_keeps_input_order() {
        let chunks = chunks(3);
        let reranker = Reranker::new(ScriptedModel::new(Reply::Fail), Duration::from_secs(5));
        let out = reranker.rerank("q", candidates(&chunks)).await;
        assert_eq!(ids(&out), ids(&candidates(&chunks)));
    }

    #[tokio::test]
    async fn test_unparsable_reply_keeps_input_order() {
        let chunks = chunks(3);
        let reranker = Reranker::new(
            ScriptedModel::new(Reply::Text("They are all relevant.")),
            Duration::from_secs(5),
        );
        let out = reranker.rerank("q", candidates(&chunks)).await;
        assert_eq!(ids(&out), vec!["chunk_0", "chunk_1", "chunk_2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_input_order() {
        let chunks = chunks(2);
        let reranker = Reranker::new(ScriptedModel::new(Reply::Hang), Duration::from_secs(20));
        let out = reranker.rerank("q", candidates(&chunks)).await;
        assert_eq!(ids(&out), vec!["chunk_0", "chunk_1"]);
    }

    #[tokio::test]
    async fn test_single_candidate_skips_model() {
        let chunks = chunks(1);
        let model = ScriptedModel::new(Reply::Text("1"));
        let reranker = Reranker::new(model.clone(), Duration::from_secs(5));
        let out = reranker.rerank("q", candidates(&chunks)).await;
        assert_eq!(out.len(), 1);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }
}
