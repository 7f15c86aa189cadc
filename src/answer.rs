//! Answer stage: grounded generation over the top reranked candidates.
//!
//! The model is shown only the candidates passed in, each as
//! `Source: <url>` followed by its text. When it declines, the reply is
//! normalised to [`REFUSAL`] exactly with no sources. Provider errors,
//! timeouts and empty completions become [`APOLOGY`].

use std::sync::Arc;
use std::time::Duration;

use sitesage_core::models::QueryResult;
use sitesage_core::retrieve::Candidate;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::ChatModel;

pub const REFUSAL: &str =
    "I'm sorry, I don't have specific information about that in my knowledge base.";
pub const APOLOGY: &str = "I encountered an error processing your request.";
pub const NOT_INITIALIZED: &str =
    "I'm sorry, I can't answer that. My knowledge base is not initialized.";

pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
    timeout: Duration,
    company_name: String,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn ChatModel>, timeout: Duration, company_name: impl Into<String>) -> Self {
        Self {
            model,
            timeout,
            company_name: company_name.into(),
        }
    }

    pub async fn answer(&self, query: &str, candidates: &[Candidate<'_>]) -> QueryResult {
        let prompt = answer_prompt(&self.company_name, query, &build_context(candidates));

        match self.generate(&prompt).await {
            Ok(text) if is_refusal(&text) => {
                debug!("model declined to answer");
                QueryResult::unsourced(REFUSAL)
            }
            Ok(text) => QueryResult {
                response: text,
                sources: collect_sources(candidates),
            },
            Err(err) => {
                warn!(error = %err, "returning apology");
                QueryResult::unsourced(APOLOGY)
            }
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let text = tokio::time::timeout(self.timeout, self.model.complete(prompt))
            .await
            .map_err(|_| PipelineError::Timeout {
                stage: "generation",
                secs: self.timeout.as_secs(),
            })?
            .map_err(PipelineError::generation)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::GenerationFailure(format!(
                "{} returned an empty answer",
                self.model.model_name()
            )));
        }
        Ok(text.to_string())
    }
}

/// `Source: <url>\n<content>` per candidate, in rank order, separated by a
/// blank line.
pub fn build_context(candidates: &[Candidate<'_>]) -> String {
    candidates
        .iter()
        .map(|c| format!("Source: {}\n{}", c.chunk.source_url, c.chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Source URLs of `candidates`, deduplicated, in first-seen order.
pub fn collect_sources(candidates: &[Candidate<'_>]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for c in candidates {
        if !sources.iter().any(|s| s == &c.chunk.source_url) {
            sources.push(c.chunk.source_url.clone());
        }
    }
    sources
}

/// Matches the refusal sentence anywhere in `text`, ignoring case, a
/// missing final period and typographic apostrophes.
fn is_refusal(text: &str) -> bool {
    let normalized = text.replace(['\u{2018}', '\u{2019}'], "'").to_lowercase();
    normalized.contains(&REFUSAL.trim_end_matches('.').to_lowercase())
}

pub fn answer_prompt(company_name: &str, query: &str, context: &str) -> String {
    format!(
        r#"You are a helpful assistant for {company_name}. Answer the user's question using ONLY the provided context.

### Rules:
1. If the context contains the answer, be concise and professional.
2. If the context DOES NOT contain the answer, say exactly: "{REFUSAL}"
3. DO NOT use outside knowledge or hallucinate.
4. If the user greets you, respond politely and mention you can help with {company_name} services.

### Context:
{context}

### User Question:
"{query}"

### Answer:"#
    )
}
