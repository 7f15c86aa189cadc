//! Knowledge-base building and knowledge-file I/O.
//!
//! `sage build` turns extracted pages into a knowledge file:
//! pages → sentence split → sentence embeddings → semantic chunks. The
//! query side only ever reads the resulting file back through
//! [`load_knowledge`], which fails softly with
//! [`PipelineError::IngestionEmpty`].

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use sitesage_core::category::{CategoryRules, HOMEPAGE};
use sitesage_core::chunk::{chunk_page, split_sentences, ChunkingParams, IdSequence};
use sitesage_core::models::{CompanyInfo, KnowledgeBase, KnowledgeStats, Page};

use crate::embedding::{embed_batched, Embedder};
use crate::error::PipelineError;

const DESCRIPTION_CHARS: usize = 500;

#[derive(Deserialize)]
#[serde(untagged)]
enum PagesFile {
    List(Vec<Page>),
    Wrapped { pages: Vec<Page> },
}

/// Read extracted pages: either a JSON array of pages or `{"pages": [...]}`.
pub fn load_pages(path: &Path) -> Result<Vec<Page>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pages file: {}", path.display()))?;
    let parsed: PagesFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse pages file: {}", path.display()))?;
    Ok(match parsed {
        PagesFile::List(pages) | PagesFile::Wrapped { pages } => pages,
    })
}

/// Everything [`build_knowledge_base`] needs besides the pages.
pub struct BuildOptions<'a> {
    pub company_name: &'a str,
    pub rules: &'a CategoryRules,
    pub chunking: ChunkingParams,
    pub batch_size: usize,
}

/// Chunk every page with one shared id sequence and assemble the
/// knowledge document.
pub async fn build_knowledge_base(
    pages: Vec<Page>,
    embedder: &dyn Embedder,
    opts: &BuildOptions<'_>,
) -> Result<KnowledgeBase> {
    let mut ids = IdSequence::new();
    let mut chunks = Vec::new();

    for (i, page) in pages.iter().enumerate() {
        let sentences = split_sentences(&page.text);
        if sentences.is_empty() {
            debug!(url = %page.url, "page has no text, skipping");
            continue;
        }

        let owned: Vec<String> = sentences.iter().map(|s| s.to_string()).collect();
        let embeddings = embed_batched(embedder, &owned, opts.batch_size)
            .await
            .with_context(|| format!("Failed to embed sentences of {}", page.url))?;

        let page_chunks = chunk_page(
            page,
            &sentences,
            &embeddings,
            opts.rules,
            &opts.chunking,
            &mut ids,
        )
        .with_context(|| format!("Failed to chunk {}", page.url))?;

        info!(
            "[{}/{}] {} → {} sentences, {} chunks",
            i + 1,
            pages.len(),
            page.url,
            sentences.len(),
            page_chunks.len()
        );
        chunks.extend(page_chunks);
    }

    let company = company_info(opts.company_name, &pages, opts.rules);
    let metadata = KnowledgeStats {
        generated_at: Utc::now(),
        total_pages: pages.len(),
        total_chunks: chunks.len(),
    };

    Ok(KnowledgeBase {
        company,
        pages,
        chunks,
        metadata: Some(metadata),
    })
}

fn company_info(name: &str, pages: &[Page], rules: &CategoryRules) -> CompanyInfo {
    let homepage = pages.iter().find(|p| rules.categorize(&p.url) == HOMEPAGE);
    CompanyInfo {
        name: name.to_string(),
        website: homepage.map(|p| p.url.clone()).unwrap_or_default(),
        description: homepage
            .map(|p| p.text.chars().take(DESCRIPTION_CHARS).collect())
            .unwrap_or_default(),
    }
}

pub fn write_knowledge(path: &Path, kb: &KnowledgeBase) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(kb)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write knowledge file: {}", path.display()))?;
    Ok(())
}

/// Load a knowledge file for indexing.
///
/// Chunks with a repeated id are dropped (first occurrence wins).
pub fn load_knowledge(path: &Path) -> Result<KnowledgeBase, PipelineError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::IngestionEmpty(format!("cannot read {}: {}", path.display(), e))
    })?;
    let mut kb: KnowledgeBase = serde_json::from_str(&content).map_err(|e| {
        PipelineError::IngestionEmpty(format!("cannot parse {}: {}", path.display(), e))
    })?;

    let mut seen = HashSet::new();
    kb.chunks.retain(|chunk| {
        let fresh = seen.insert(chunk.id.clone());
        if !fresh {
            warn!(id = %chunk.id, "dropping chunk with duplicate id");
        }
        fresh
    });

    if kb.chunks.is_empty() {
        return Err(PipelineError::IngestionEmpty(format!(
            "{} contains no chunks",
            path.display()
        )));
    }
    Ok(kb)
}
