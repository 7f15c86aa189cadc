//! # SiteSage
//!
//! Grounded question answering over content harvested from one website.
//!
//! Extracted pages are split into semantically coherent chunks and
//! indexed twice (embeddings and BM25). Each question retrieves
//! candidates from both indexes and fuses them. A small chat model reranks
//! the fused candidates, and a stronger one answers from the top few
//! only. When the context does not hold the answer it replies with a
//! fixed refusal.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────────┐
//! │  Pages   │──▶│ sage build   │──▶│ knowledge.json │
//! │  (JSON)  │   │ split+chunk  │   └───────┬────────┘
//! └──────────┘   └──────────────┘           │ initialize
//!                                           ▼
//!                 ┌──────────────────────────────────────┐
//!                 │ AnswerEngine                         │
//!                 │ dense+BM25 → fuse → rerank → answer  │
//!                 └──────────┬─────────────────┬─────────┘
//!                            ▼                 ▼
//!                       ┌────────┐       ┌──────────┐
//!                       │  CLI   │       │   HTTP   │
//!                       │ (sage) │       │ /api/chat│
//!                       └────────┘       └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Chat model provider abstraction |
//! | [`ingest`] | Page loading and knowledge-file building |
//! | [`rerank`] | LLM rerank stage with fallback |
//! | [`answer`] | Grounded answer stage and refusal policy |
//! | [`engine`] | Query orchestration and index snapshots |
//! | [`server`] | HTTP server |
//! | [`error`] | Pipeline degradation errors |
//!
//! Pure algorithms (chunking, indexes, fusion, rerank parsing) live in
//! the `sitesage-core` crate.

pub mod answer;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
mod http;
pub mod ingest;
pub mod llm;
pub mod rerank;
pub mod server;
