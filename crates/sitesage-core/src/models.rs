//! Core data models used throughout sitesage.
//!
//! These types represent the pages, chunks, and answers that flow through
//! the ingestion and query pipeline. The serialized shapes match the
//! knowledge file written by `sage build` and read by `sage serve`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extracted content for one crawled location.
///
/// Produced by the external extractor. `text` holds one sentence per
/// line; the extractor's `main_content` field name is accepted too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub scraped_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "main_content")]
    pub text: String,
}

/// A bounded, semantically coherent unit of page text.
///
/// `embedding` is never serialized; it is recomputed from `content`
/// every time an index is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_url: String,
    pub category: String,
    pub title: String,
    pub content: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// Organisation summary derived from the homepage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub description: String,
}

/// Build statistics stored alongside the chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub generated_at: DateTime<Utc>,
    pub total_pages: usize,
    pub total_chunks: usize,
}

/// The knowledge document: the ingestion input of the query side.
///
/// Only `chunks` is required; files produced by other tools may omit the
/// rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub company: CompanyInfo,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<KnowledgeStats>,
}

/// The externally visible answer to one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub response: String,
    pub sources: Vec<String>,
}

impl QueryResult {
    /// A response with no supporting sources.
    pub fn unsourced(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            sources: Vec::new(),
        }
    }
}
