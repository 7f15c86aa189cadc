//! Deterministic stand-ins for the embedding and chat providers.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sitesage_core::category::CategoryRules;
use sitesage_core::chunk::ChunkingParams;
use sitesage_core::index::tokenize;
use sitesage_core::models::{KnowledgeBase, Page};

use sitesage::answer::{AnswerGenerator, REFUSAL};
use sitesage::embedding::Embedder;
use sitesage::engine::{AnswerEngine, EngineSettings};
use sitesage::ingest::{build_knowledge_base, BuildOptions};
use sitesage::llm::ChatModel;
use sitesage::rerank::Reranker;

pub const DIMS: usize = 256;

/// Feature-hashed bag of words: cosine similarity tracks term overlap.
/// Single-text calls are queries; anything larger is an indexing batch.
pub struct HashingEmbedder {
    pub fail_queries: AtomicBool,
    pub stall_queries: AtomicBool,
    pub stall_batches: AtomicBool,
}

impl HashingEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_queries: AtomicBool::new(false),
            stall_queries: AtomicBool::new(false),
            stall_batches: AtomicBool::new(false),
        })
    }
}

fn fnv1a(term: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in term.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash as usize
}

pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for term in tokenize(text) {
        v[fnv1a(&term) % DIMS] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let query = texts.len() == 1;
        if query && self.fail_queries.load(Ordering::SeqCst) {
            bail!("embedding service unavailable");
        }
        let stall = if query {
            &self.stall_queries
        } else {
            &self.stall_batches
        };
        if stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }
}

fn overlap(query: &str, text: &str) -> usize {
    let terms: HashSet<String> = tokenize(text).into_iter().collect();
    tokenize(query)
        .into_iter()
        .collect::<HashSet<_>>()
        .iter()
        .filter(|t| terms.contains(*t))
        .count()
}

/// Extracts the quoted question that follows `### User Question:`.
fn question_of(prompt: &str) -> String {
    prompt
        .split("### User Question:")
        .nth(1)
        .and_then(|rest| rest.trim_start().lines().next())
        .map(|line| line.trim().trim_matches('"').to_string())
        .unwrap_or_default()
}

/// Ranks the numbered documents in a rerank prompt by term overlap with
/// the question.
pub struct KeywordJudge;

#[async_trait]
impl ChatModel for KeywordJudge {
    fn model_name(&self) -> &str {
        "keyword-judge"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let question = question_of(prompt);
        let documents = prompt
            .split("### Documents:")
            .nth(1)
            .and_then(|rest| rest.split("\n---").next())
            .unwrap_or_default();

        let mut scored: Vec<(usize, usize)> = documents
            .lines()
            .filter_map(|line| {
                let (num, text) = line.split_once(". ")?;
                Some((num.trim().parse().ok()?, overlap(&question, text)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(scored
            .iter()
            .map(|(n, _)| n.to_string())
            .collect::<Vec<_>>()
            .join(", "))
    }
}

/// Answers with the first context passage that shares a term with the
/// question, otherwise declines (with trailing chatter).
pub struct GroundedWriter;

#[async_trait]
impl ChatModel for GroundedWriter {
    fn model_name(&self) -> &str {
        "grounded-writer"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let question = question_of(prompt);
        let context = prompt
            .split("### Context:")
            .nth(1)
            .and_then(|rest| rest.split("### User Question:").next())
            .unwrap_or_default();

        let passage = context
            .split("\n\n")
            .filter_map(|block| block.trim().lines().nth(1))
            .find(|content| overlap(&question, content) > 0);

        Ok(match passage {
            Some(content) => format!("According to our site: {}", content),
            None => format!("{} Is there anything else I can help with?", REFUSAL),
        })
    }
}

/// Replies with fixed text, fails, or never replies.
pub enum Scripted {
    Text(&'static str),
    Fail,
    Hang,
}

pub struct ScriptedModel {
    pub behaviour: Scripted,
    pub calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(behaviour: Scripted) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Scripted::Text(text) => Ok(text.to_string()),
            Scripted::Fail => bail!("upstream returned 502"),
            Scripted::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }
    }
}

pub fn page(url: &str, title: &str, text: &str) -> Page {
    Page {
        url: url.to_string(),
        title: title.to_string(),
        scraped_at: None,
        text: text.to_string(),
    }
}

pub fn engine_with(
    embedder: Arc<dyn Embedder>,
    rerank_model: Arc<dyn ChatModel>,
    answer_model: Arc<dyn ChatModel>,
) -> AnswerEngine {
    AnswerEngine::new(
        embedder,
        Reranker::new(rerank_model, Duration::from_secs(20)),
        AnswerGenerator::new(answer_model, Duration::from_secs(45), "Acme Advisory"),
        EngineSettings::default(),
    )
}

pub fn default_engine() -> AnswerEngine {
    engine_with(
        HashingEmbedder::new(),
        Arc::new(KeywordJudge),
        Arc::new(GroundedWriter),
    )
}

pub async fn knowledge(pages: Vec<Page>) -> KnowledgeBase {
    let rules = CategoryRules::default();
    let opts = BuildOptions {
        company_name: "Acme Advisory",
        rules: &rules,
        chunking: ChunkingParams::default(),
        batch_size: 32,
    };
    build_knowledge_base(pages, HashingEmbedder::new().as_ref(), &opts)
        .await
        .unwrap()
}

/// Two pages: A holds the tax-credit fact, B is unrelated.
pub fn tax_pages() -> Vec<Page> {
    vec![
        page(
            "https://acme.com/tax-credits/overview",
            "Tax Credits",
            "R&D tax credits carry forward 20 years",
        ),
        page(
            "https://acme.com/our-team",
            "Our Team",
            "Our partners enjoy hiking in the mountains every summer",
        ),
    ]
}
