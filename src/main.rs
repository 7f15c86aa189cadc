//! # SiteSage CLI (`sage`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sage build` | Chunk extracted pages into a knowledge file |
//! | `sage ask "<question>"` | Answer one question from the knowledge file |
//! | `sage search "<query>"` | Show fused retrieval candidates |
//! | `sage serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! sage build --config ./config/sage.toml
//! sage ask "Do R&D tax credits carry forward?"
//! sage search "tax credits" --mode keyword --explain
//! RUST_LOG=sitesage=debug sage serve
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sitesage_core::retrieve::RetrievalMode;

use sitesage::config::{load_config, Config};
use sitesage::embedding::create_embedder;
use sitesage::engine::AnswerEngine;
use sitesage::ingest::{build_knowledge_base, load_pages, write_knowledge, BuildOptions};
use sitesage::server::run_server;

/// SiteSage: grounded answers over a website's own content.
#[derive(Parser)]
#[command(name = "sage", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sage.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the knowledge file from extracted pages.
    ///
    /// Reads `[knowledge].pages_path` (or `--pages`), splits each page
    /// into sentences, groups them into semantic chunks, and writes
    /// `[knowledge].path` (or `--out`).
    Build {
        /// Pages JSON file (overrides `knowledge.pages_path`).
        #[arg(long)]
        pages: Option<PathBuf>,

        /// Output knowledge file (overrides `knowledge.path`).
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Answer a single question.
    Ask {
        question: String,
    },

    /// Run retrieval only and print the fused candidates.
    Search {
        query: String,

        /// `dense` (semantic), `sparse` (keyword), or `hybrid`.
        #[arg(long, default_value = "hybrid")]
        mode: RetrievalMode,

        /// Maximum number of results to print.
        #[arg(long)]
        limit: Option<usize>,

        /// Show per-list ranks alongside the fused score.
        #[arg(long)]
        explain: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Build { pages, out } => run_build(&config, pages, out).await,
        Commands::Ask { question } => {
            let engine = ready_engine(&config).await?;
            let result = engine.answer_query(&question).await;
            println!("{}", result.response);
            if !result.sources.is_empty() {
                println!();
                println!("Sources:");
                for source in &result.sources {
                    println!("  {}", source);
                }
            }
            Ok(())
        }
        Commands::Search {
            query,
            mode,
            limit,
            explain,
        } => {
            let engine = ready_engine(&config).await?;
            let mut hits = engine.search(&query, mode).await.unwrap_or_default();
            if let Some(limit) = limit {
                hits.truncate(limit);
            }
            if hits.is_empty() {
                println!("No results.");
                return Ok(());
            }

            for (i, hit) in hits.iter().enumerate() {
                println!(
                    "{}. [{:.4}] {} / {}",
                    i + 1,
                    hit.fused_score,
                    hit.chunk.category,
                    hit.chunk.id
                );
                println!("    url: {}", hit.chunk.source_url);
                if explain {
                    let rank = |r: Option<usize>| r.map_or("-".to_string(), |r| r.to_string());
                    println!(
                        "    dense rank: {}  sparse rank: {}",
                        rank(hit.dense_rank),
                        rank(hit.sparse_rank)
                    );
                }
                let excerpt: String = hit.chunk.content.chars().take(160).collect();
                println!("    excerpt: \"{}\"", excerpt.trim());
                println!();
            }
            Ok(())
        }
        Commands::Serve => {
            let engine = Arc::new(AnswerEngine::from_config(&config)?);
            // a failed load still serves: queries get the not-initialized answer
            engine.initialize_from_path(&config.knowledge.path).await;
            run_server(engine, &config.server.bind).await
        }
    }
}

async fn ready_engine(config: &Config) -> Result<AnswerEngine> {
    let engine = AnswerEngine::from_config(config)?;
    if !engine.initialize_from_path(&config.knowledge.path).await {
        bail!(
            "No usable knowledge at {}. Run `sage build` first.",
            config.knowledge.path.display()
        );
    }
    Ok(engine)
}

async fn run_build(config: &Config, pages: Option<PathBuf>, out: Option<PathBuf>) -> Result<()> {
    let pages_path = pages
        .or_else(|| config.knowledge.pages_path.clone())
        .context("No pages file: pass --pages or set knowledge.pages_path")?;
    let out_path = out.unwrap_or_else(|| config.knowledge.path.clone());

    let pages = load_pages(&pages_path)?;
    info!(pages = pages.len(), "loaded {}", pages_path.display());

    let embedder = create_embedder(&config.embedding)?;
    let rules = config.category_rules();
    let opts = BuildOptions {
        company_name: &config.assistant.company_name,
        rules: &rules,
        chunking: config.chunking.params(),
        batch_size: config.embedding.batch_size,
    };

    let kb = build_knowledge_base(pages, embedder.as_ref(), &opts).await?;
    write_knowledge(&out_path, &kb)?;

    println!("build complete");
    println!("  pages: {}", kb.pages.len());
    println!("  chunks: {}", kb.chunks.len());
    println!("  written: {}", out_path.display());
    Ok(())
}
